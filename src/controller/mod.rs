// src/controller/mod.rs

//! The workflow server a task reports to.
//!
//! Two callers use the [`Controller`] trait:
//!
//! - the lifecycle session of a running job (`configure`, `report_*`);
//! - the submission path (`update_handle`, `force_state`, `append_log`).
//!
//! [`EcflowClient`] is the production implementation; tests use the
//! recording controller from `jobsub-test-utils`.

pub mod ecflow;
pub mod log;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::Result;
use crate::task::TaskIdentity;
use crate::types::{ForcedState, JobHandle};

pub use ecflow::EcflowClient;
pub use log::TextLog;

pub type ControllerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Default bound on each call to the server.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Identity a running job presents to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSettings {
    pub remote_id: u32,
    pub path: String,
    pub credential: String,
    pub try_number: u32,
    pub timeout: Duration,
}

impl ChildSettings {
    pub fn for_task(task: &TaskIdentity, timeout: Duration) -> Self {
        Self {
            remote_id: task.remote_id(),
            path: task.path().to_string(),
            credential: task.credential().to_string(),
            try_number: task.try_number(),
            timeout,
        }
    }
}

pub trait Controller: Send + Sync {
    /// Bind the following `report_*` calls to one task attempt.
    fn configure(&mut self, child: ChildSettings);

    fn report_init(&self) -> ControllerFuture<'_>;

    fn report_complete(&self) -> ControllerFuture<'_>;

    fn report_abort<'a>(&'a self, reason: &'a str) -> ControllerFuture<'a>;

    /// Store the job handle of `path` on the server.
    fn update_handle<'a>(&'a self, path: &'a str, handle: &'a JobHandle) -> ControllerFuture<'a>;

    fn force_state<'a>(&'a self, path: &'a str, state: ForcedState) -> ControllerFuture<'a>;

    /// Append one line to the shared text log.
    fn append_log(&self, text: &str) -> Result<()>;
}
