// src/task/mod.rs

//! Identity of one task attempt and the file names derived from it.

pub mod identity;

pub use identity::{JobPaths, TaskIdentity};
