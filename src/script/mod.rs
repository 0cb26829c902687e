// src/script/mod.rs

//! Job script materialization.

pub mod writer;

pub use writer::{HOST_PLACEHOLDER, JobScriptWriter, WRAPPER_PLACEHOLDER};
