// src/backend/batch.rs

//! Batch queue systems (PBS, Slurm, Grid Engine).
//!
//! The three systems only differ in data: program names, the directive
//! prefix, a few flags and the shape of the submit answer. They share one
//! [`BatchSpec`] type instead of one type per system.

use crate::backend::BackendKind;
use crate::backend::job_id::{JobIdParser, TokenPick, TokenRule};
use crate::errors::Result;
use crate::settings::ResolvedSettings;
use crate::types::JobHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSpec {
    pub kind: BackendKind,
    pub submit_program: String,
    pub status_program: String,
    pub kill_program: String,
    /// Comment marker of job script directives (`#PBS`, `#SBATCH`, `#$`).
    pub prefix: &'static str,
    /// Flag that exports one variable into the job (`-v`, `--export`).
    pub variable_flag: &'static str,
    /// Flag that names the job (`-N`, `-J`).
    pub name_flag: &'static str,
    pub name_max_len: Option<usize>,
    /// PBS joins stdout and stderr with `-j oe`.
    pub join_output: bool,
    pub id_rule: TokenRule,
}

impl BatchSpec {
    pub fn pbs() -> Self {
        Self {
            kind: BackendKind::Pbs,
            submit_program: "qsub".to_string(),
            status_program: "qstat -j".to_string(),
            kill_program: "qdel".to_string(),
            prefix: "#PBS",
            variable_flag: "-v",
            name_flag: "-N",
            name_max_len: Some(15),
            join_output: true,
            // "12345.server" on a line of its own
            id_rule: TokenRule::new(1, TokenPick::First),
        }
    }

    pub fn slurm() -> Self {
        Self {
            kind: BackendKind::Slurm,
            submit_program: "sbatch".to_string(),
            status_program: "squeue -j".to_string(),
            kill_program: "scancel".to_string(),
            prefix: "#SBATCH",
            variable_flag: "--export",
            name_flag: "-J",
            name_max_len: None,
            join_output: false,
            // Submitted batch job 12345
            id_rule: TokenRule::new(4, TokenPick::Last),
        }
    }

    pub fn grid_engine() -> Self {
        Self {
            kind: BackendKind::GridEngine,
            submit_program: "qsub".to_string(),
            status_program: "qstat -j".to_string(),
            kill_program: "qdel".to_string(),
            prefix: "#$",
            variable_flag: "-v",
            name_flag: "-N",
            name_max_len: None,
            join_output: false,
            // Your job 12345 ("name") has been submitted
            id_rule: TokenRule::new(7, TokenPick::Nth(2)),
        }
    }

    /// Replace the submit, status and kill programs.
    pub fn with_programs(
        mut self,
        submit: impl Into<String>,
        status: impl Into<String>,
        kill: impl Into<String>,
    ) -> Self {
        self.submit_program = submit.into();
        self.status_program = status.into();
        self.kill_program = kill.into();
        self
    }

    pub fn submit_command(&self, settings: &ResolvedSettings) -> String {
        let mut parts = vec![self.submit_program.clone()];
        if let Some(vars) = &settings.submit_variables {
            for (key, value) in vars.iter() {
                parts.push(format!("{} {key}={value}", self.variable_flag));
            }
        }
        parts.push(settings.paths.job_at_host.to_string_lossy().into_owned());
        parts.join(" ")
    }

    pub fn status_command(&self, handle: &JobHandle) -> String {
        format!("{} {handle}", self.status_program)
    }

    pub fn kill_command(&self, handle: &JobHandle) -> String {
        format!("{} {handle}", self.kill_program)
    }

    pub fn output_directive(&self, settings: &ResolvedSettings) -> String {
        let jobout = settings.paths.jobout_at_host.to_string_lossy();
        let mut lines = vec![
            format!("{} -o {jobout}", self.prefix),
            format!("{} -e {jobout}", self.prefix),
        ];
        if self.join_output {
            lines.push(format!("{} -j oe", self.prefix));
        }
        lines.join("\n")
    }

    pub fn name_directive(&self, task_name: &str) -> String {
        let name: String = match self.name_max_len {
            Some(max) => task_name.chars().take(max).collect(),
            None => task_name.to_string(),
        };
        format!("{} {} {name}", self.prefix, self.name_flag)
    }
}

impl JobIdParser for BatchSpec {
    fn parse_job_id(&self, output: &str) -> Result<JobHandle> {
        self.id_rule.parse_job_id(output)
    }
}
