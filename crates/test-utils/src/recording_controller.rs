use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobsub::controller::{ChildSettings, Controller, ControllerFuture};
use jobsub::errors::{JobsubError, Result};
use jobsub::types::{ForcedState, JobHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Configured(ChildSettings),
    Init,
    Complete,
    Abort(String),
    HandleUpdated { path: String, handle: String },
    StateForced { path: String, state: ForcedState },
    Log(String),
}

/// A fake controller that records every call.
///
/// Clones share the same event list, so a test can keep one copy and hand
/// the other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingController {
    events: Arc<Mutex<Vec<ControllerEvent>>>,
    fail_init: bool,
    signal_in_complete: Option<i32>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `report_init` fail, as an unreachable server would.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Raise `signal` while `report_complete` is in flight, then keep the
    /// call pending for a while.
    pub fn signal_during_complete(mut self, signal: i32) -> Self {
        self.signal_in_complete = Some(signal);
        self
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Lines appended to the shared log.
    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Log(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn aborts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Abort(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ControllerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Controller for RecordingController {
    fn configure(&mut self, child: ChildSettings) {
        self.push(ControllerEvent::Configured(child));
    }

    fn report_init(&self) -> ControllerFuture<'_> {
        Box::pin(async move {
            if self.fail_init {
                return Err(JobsubError::Controller("server unreachable".to_string()));
            }
            self.push(ControllerEvent::Init);
            Ok(())
        })
    }

    fn report_complete(&self) -> ControllerFuture<'_> {
        Box::pin(async move {
            self.push(ControllerEvent::Complete);
            if let Some(signal) = self.signal_in_complete {
                jobsub::lifecycle::signals::reraise(signal);
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(())
        })
    }

    fn report_abort<'a>(&'a self, reason: &'a str) -> ControllerFuture<'a> {
        Box::pin(async move {
            self.push(ControllerEvent::Abort(reason.to_string()));
            Ok(())
        })
    }

    fn update_handle<'a>(&'a self, path: &'a str, handle: &'a JobHandle) -> ControllerFuture<'a> {
        Box::pin(async move {
            self.push(ControllerEvent::HandleUpdated {
                path: path.to_string(),
                handle: handle.to_string(),
            });
            Ok(())
        })
    }

    fn force_state<'a>(&'a self, path: &'a str, state: ForcedState) -> ControllerFuture<'a> {
        Box::pin(async move {
            self.push(ControllerEvent::StateForced {
                path: path.to_string(),
                state,
            });
            Ok(())
        })
    }

    fn append_log(&self, text: &str) -> Result<()> {
        self.push(ControllerEvent::Log(text.to_string()));
        Ok(())
    }
}
