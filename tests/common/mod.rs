#![allow(dead_code)]

pub use jobsub_test_utils::*;

use std::path::{Path, PathBuf};

use jobsub::config::{JobOutDirs, SubmissionPolicy};
use jobsub::settings::{ResolvedSettings, SettingsResolver};
use jobsub::task::TaskIdentity;
use jobsub::types::HostIndex;
use tempfile::TempDir;

/// Job script body with both placeholders, as the workflow server writes it.
pub const JOB_BODY: &str = "echo running on @HOST_TO_BE_SUBSTITUTED@\n@WRAPPER_TO_BE_SUBSTITUTED@ ./model\n";

/// A temporary local and remote job output directory.
pub struct Fixture {
    pub dir: TempDir,
    pub joboutdirs: JobOutDirs,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let joboutdirs = JobOutDirs::single(dir.path().join("local"))
            .with(HostIndex::Secondary, dir.path().join("remote"));
        Self { dir, joboutdirs }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Resolve `task` and create its job stub.
    pub fn prepare(
        &self,
        policy: &SubmissionPolicy,
        task: &TaskIdentity,
        coldstart: bool,
    ) -> ResolvedSettings {
        let settings = SettingsResolver::new(policy, &self.joboutdirs)
            .coldstart(coldstart)
            .resolve(task)
            .expect("settings resolve");
        write_job_stub(&settings, JOB_BODY);
        settings
    }
}
