use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use jobsub::backend::{CommandRunner, LogMode, RunnerFuture};

/// One command handed to the fake runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub cmd: String,
    pub log: PathBuf,
    pub detached: bool,
}

#[derive(Debug)]
struct State {
    commands: Vec<RecordedCommand>,
    output: String,
    exit_code: i32,
    pid: u32,
}

/// A fake runner that:
/// - records every command instead of running it
/// - writes a canned answer into the log file
/// - returns a configurable exit code / pid.
#[derive(Debug, Clone)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                commands: vec![],
                output: String::new(),
                exit_code: 0,
                pid: 4242,
            })),
        }
    }

    /// Text written to the log of every waited-for command.
    pub fn with_output(self, output: &str) -> Self {
        self.state.lock().unwrap().output = output.to_string();
        self
    }

    pub fn with_exit_code(self, code: i32) -> Self {
        self.state.lock().unwrap().exit_code = code;
        self
    }

    pub fn with_pid(self, pid: u32) -> Self {
        self.state.lock().unwrap().pid = pid;
        self
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    fn record(&self, cmd: &str, log: &Path, detached: bool) {
        self.state.lock().unwrap().commands.push(RecordedCommand {
            cmd: cmd.to_string(),
            log: log.to_path_buf(),
            detached,
        });
    }
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for FakeRunner {
    fn run_logged<'a>(
        &'a self,
        cmd: &'a str,
        log: &'a Path,
        mode: LogMode,
    ) -> RunnerFuture<'a, i32> {
        Box::pin(async move {
            self.record(cmd, log, false);
            let (output, code) = {
                let state = self.state.lock().unwrap();
                (state.output.clone(), state.exit_code)
            };

            if let Some(parent) = log.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = match mode {
                LogMode::Truncate => fs::File::create(log)?,
                LogMode::Append => OpenOptions::new().create(true).append(true).open(log)?,
            };
            file.write_all(output.as_bytes())?;
            Ok(code)
        })
    }

    fn spawn_detached<'a>(&'a self, cmd: &'a str, output: &'a Path) -> RunnerFuture<'a, u32> {
        Box::pin(async move {
            self.record(cmd, output, true);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::File::create(output)?;
            Ok(self.state.lock().unwrap().pid)
        })
    }
}
