// src/backend/background.rs

//! Jobs started as detached child processes of the submitting process.

use crate::settings::ResolvedSettings;
use crate::types::JobHandle;

pub const OUTPUT_DIRECTIVE: &str = "# Background jobs use standard output/error";
pub const NAME_DIRECTIVE: &str = "# Background jobs get job name from process name";

/// The in-process backend. The job handle is the child's pid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Background;

impl Background {
    /// `export K=V; ` per submit variable, then the local job script.
    pub fn submit_command(&self, settings: &ResolvedSettings) -> String {
        let mut cmd = String::new();
        if let Some(vars) = &settings.submit_variables {
            for (key, value) in vars.iter() {
                cmd.push_str(&format!("export {key}={value}; "));
            }
        }
        cmd.push_str(&settings.paths.job.to_string_lossy());
        cmd
    }

    pub fn status_command(&self, handle: &JobHandle) -> String {
        format!("ps -p {handle} -o pid,stat,etime,args")
    }

    pub fn kill_command(&self, handle: &JobHandle) -> String {
        format!("kill -9 {handle}")
    }
}
