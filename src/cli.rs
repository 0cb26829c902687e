// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `jobsub`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobsub",
    version,
    about = "Submit, query and kill the jobs of workflow tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBSUB_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Write the job script of a task and submit it.
    Submit(SubmitArgs),
    /// Query the backend for the state of a submitted job.
    Status(JobArgs),
    /// Kill a submitted job.
    Kill(JobArgs),
    /// Run a command as the job of a task, reporting init/complete/abort.
    Run(RunArgs),
}

/// Which task attempt to act on.
#[derive(Debug, Clone, Args)]
pub struct TaskArgs {
    /// Full node path of the task, e.g. `/exp/Forecasting/Forecast`.
    #[arg(long, value_name = "PATH")]
    pub name: String,

    /// Try number of this attempt.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub tryno: u32,

    /// Password the task uses towards the server.
    #[arg(long, value_name = "PASS", default_value = "")]
    pub pass: String,

    /// Remote process id; defaults to the pid of this process.
    #[arg(long, value_name = "ID")]
    pub rid: Option<String>,
}

/// Where the submission policy and job directories are.
#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    /// Submission policy (JSON, or TOML when the name ends in `.toml`).
    #[arg(long, value_name = "PATH")]
    pub policy: PathBuf,

    /// Job output directory on host 0.
    #[arg(long, value_name = "DIR")]
    pub joboutdir: PathBuf,

    /// Job output directory on host 1, for dual-host setups.
    #[arg(long, value_name = "DIR")]
    pub joboutdir_host1: Option<PathBuf>,

    /// This is a cold start; cold-start exceptions apply.
    #[arg(long)]
    pub coldstart: bool,

    /// Interpreter line used when the policy does not set INTERPRETER.
    #[arg(long, value_name = "LINE")]
    pub interpreter: Option<String>,
}

/// How to reach the workflow server.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Server settings (JSON with ECF_HOST, ECF_PORT, ECF_PORT_OFFSET).
    #[arg(long, value_name = "PATH")]
    pub server: Option<PathBuf>,

    /// Shared text log.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Environment file copied into the job header.
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Monitoring database; submitted job ids are appended to it.
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Resolve settings and print the commands, but don't touch anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct JobArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Job id returned by the submission.
    #[arg(long, value_name = "ID")]
    pub submission_id: Option<String>,

    /// Resolve settings and print the command, but don't run it.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Seconds to wait for each server call.
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub timeout: u64,

    /// Command to run (through the shell).
    #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit_with_dual_host() {
        let args = CliArgs::try_parse_from([
            "jobsub",
            "submit",
            "--name",
            "/exp/Forecast",
            "--tryno",
            "2",
            "--policy",
            "policy.json",
            "--joboutdir",
            "/local",
            "--joboutdir-host1",
            "/remote",
            "--coldstart",
            "--dry-run",
        ])
        .unwrap();
        let Command::Submit(submit) = args.command else {
            panic!("expected submit");
        };
        assert_eq!(submit.task.name, "/exp/Forecast");
        assert_eq!(submit.task.tryno, 2);
        assert!(submit.policy.coldstart);
        assert_eq!(submit.policy.joboutdir_host1, Some(PathBuf::from("/remote")));
        assert!(submit.dry_run);
    }

    #[test]
    fn run_keeps_trailing_command() {
        let args = CliArgs::try_parse_from([
            "jobsub",
            "--log-level",
            "debug",
            "run",
            "--name",
            "/exp/A",
            "python3",
            "model.py",
            "--steps",
            "3",
        ])
        .unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.command, vec!["python3", "model.py", "--steps", "3"]);
        assert_eq!(run.timeout, 20);
    }
}
