// src/config/mod.rs

//! Submission policy and server settings: serde model, loading and
//! validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_policy, load_policy_from_path, load_server_settings};
pub use model::{
    ExceptionPredicate, JobOutDirs, RawSubmissionPolicy, ServerSettings, SettingValue,
    StateExceptionRules, SubmissionPolicy, SubmitTypeDef,
};
