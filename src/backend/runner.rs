// src/backend/runner.rs

//! Child process execution for job commands.
//!
//! Backends never spawn processes themselves; they hand command strings to a
//! [`CommandRunner`]. Production code uses [`ShellRunner`], tests use the
//! fake runner from `jobsub-test-utils`.

use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{JobsubError, Result};

pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// How a command's log file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Truncate,
    Append,
}

/// Trait abstracting how job commands are executed.
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` through the shell and wait for it. Combined stdout and
    /// stderr go to `log`. Returns the exit code (-1 when killed by a signal).
    fn run_logged<'a>(
        &'a self,
        cmd: &'a str,
        log: &'a Path,
        mode: LogMode,
    ) -> RunnerFuture<'a, i32>;

    /// Start `cmd` in its own process group without waiting for it. Combined
    /// stdout and stderr go to `output`. Returns the child's pid.
    fn spawn_detached<'a>(&'a self, cmd: &'a str, output: &'a Path) -> RunnerFuture<'a, u32>;
}

/// Runs commands with `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn run_logged<'a>(
        &'a self,
        cmd: &'a str,
        log: &'a Path,
        mode: LogMode,
    ) -> RunnerFuture<'a, i32> {
        Box::pin(async move {
            info!(%cmd, log = ?log, "running command");
            let out = open_log(log, mode)?;
            let err = out.try_clone()?;

            let status = shell_command(cmd)
                .stdin(Stdio::null())
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err))
                .status()
                .await
                .with_context(|| format!("running command '{cmd}'"))?;

            let code = status.code().unwrap_or(-1);
            debug!(%cmd, exit_code = code, "command exited");
            Ok(code)
        })
    }

    fn spawn_detached<'a>(&'a self, cmd: &'a str, output: &'a Path) -> RunnerFuture<'a, u32> {
        Box::pin(async move {
            info!(%cmd, output = ?output, "starting detached process");
            let out = open_log(output, LogMode::Truncate)?;
            let err = out.try_clone()?;

            let mut command = shell_command(cmd);
            command
                .stdin(Stdio::null())
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err));
            #[cfg(unix)]
            command.process_group(0);

            let child = command
                .spawn()
                .with_context(|| format!("spawning detached process '{cmd}'"))?;
            let pid = child.id().ok_or_else(|| {
                JobsubError::Other(anyhow::anyhow!(
                    "detached process '{cmd}' exited before reporting a pid"
                ))
            })?;
            // Dropping the handle leaves the child running; tokio reaps it.
            drop(child);

            debug!(%cmd, pid, "detached process started");
            Ok(pid)
        })
    }
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn open_log(path: &Path, mode: LogMode) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut opts = OpenOptions::new();
    opts.create(true);
    match mode {
        LogMode::Truncate => opts.write(true).truncate(true),
        LogMode::Append => opts.append(true),
    };
    Ok(opts.open(path)?)
}
