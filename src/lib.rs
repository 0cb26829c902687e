// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod controller;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod script;
pub mod settings;
pub mod submit;
pub mod task;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::backend::{Backend, ShellRunner, runner::shell_command};
use crate::cli::{
    CliArgs, Command, JobArgs, PolicyArgs, RunArgs, ServerArgs, SubmitArgs, TaskArgs,
};
use crate::config::{JobOutDirs, load_policy, load_server_settings};
use crate::controller::{EcflowClient, TextLog};
use crate::lifecycle::{SessionOptions, run_session};
use crate::settings::{ResolvedSettings, SettingsResolver};
use crate::submit::{SubmitOptions, SubmitOutcome, Submission};
use crate::task::TaskIdentity;
use crate::types::{HostIndex, Operation};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Submit(args) => submit_task(args).await,
        Command::Status(args) => job_operation(args, Operation::Status).await,
        Command::Kill(args) => job_operation(args, Operation::Kill).await,
        Command::Run(args) => run_task(args).await,
    }
}

async fn submit_task(args: SubmitArgs) -> Result<()> {
    let task = task_identity(&args.task, None)?;
    let settings = resolve_settings(&args.policy, &task)?;

    if args.dry_run {
        print_dry_run(&task, &settings, Operation::Submit)?;
        return Ok(());
    }

    let controller = server_client(&args.server)?;
    let runner = ShellRunner::new();
    let mut submission = Submission::new(task, settings, &controller, &runner)?.options(
        SubmitOptions {
            env_file: args.env_file,
            db_file: args.db,
        },
    );

    match submission.submit().await? {
        SubmitOutcome::Submitted(handle) => println!("{handle}"),
        SubmitOutcome::ForcedComplete(reason) => info!(%reason, "task forced complete"),
    }
    Ok(())
}

async fn job_operation(args: JobArgs, operation: Operation) -> Result<()> {
    let task = task_identity(&args.task, args.submission_id.as_deref())?;
    let settings = resolve_settings(&args.policy, &task)?;

    if args.dry_run {
        print_dry_run(&task, &settings, operation)?;
        return Ok(());
    }

    let controller = server_client(&args.server)?;
    let runner = ShellRunner::new();
    let submission = Submission::new(task, settings, &controller, &runner)?;

    match operation {
        Operation::Status => {
            let report = submission.status().await?;
            print!("{}", report.output);
        }
        Operation::Kill => submission.kill().await?,
        Operation::Submit => bail!("submit is not a job operation"),
    }
    Ok(())
}

async fn run_task(args: RunArgs) -> Result<()> {
    let task = task_identity(&args.task, None)?;
    let mut controller = server_client(&args.server)?;
    let cmd = args.command.join(" ");
    let options = SessionOptions {
        timeout: Duration::from_secs(args.timeout),
        ..SessionOptions::default()
    };

    run_session(&mut controller, &task, options, async move {
        info!(%cmd, "running job command");
        let status = shell_command(&cmd)
            .status()
            .await
            .with_context(|| format!("starting '{cmd}'"))?;
        if !status.success() {
            bail!("command '{cmd}' exited with {status}");
        }
        Ok(())
    })
    .await?;
    Ok(())
}

fn task_identity(args: &TaskArgs, submission_id: Option<&str>) -> Result<TaskIdentity> {
    Ok(TaskIdentity::new(
        args.name.clone(),
        args.tryno,
        args.pass.clone(),
        args.rid.as_deref(),
        submission_id,
    )?)
}

fn resolve_settings(args: &PolicyArgs, task: &TaskIdentity) -> Result<ResolvedSettings> {
    let policy = load_policy(&args.policy)?;

    let mut joboutdirs = JobOutDirs::single(&args.joboutdir);
    if let Some(dir) = &args.joboutdir_host1 {
        joboutdirs = joboutdirs.with(HostIndex::Secondary, dir);
    }

    let mut resolver = SettingsResolver::new(&policy, &joboutdirs).coldstart(args.coldstart);
    if let Some(interpreter) = &args.interpreter {
        resolver = resolver.interpreter(interpreter.clone());
    }
    Ok(resolver.resolve(task)?)
}

fn server_client(args: &ServerArgs) -> Result<EcflowClient> {
    let path = args
        .server
        .as_ref()
        .context("--server is required unless --dry-run is given")?;
    let settings = load_server_settings(path)?;

    let mut client = EcflowClient::new(&settings)?;
    if let Some(log) = &args.log {
        client = client.log(TextLog::new(log));
    }
    debug!(host = %client.host(), port = client.port(), "server client ready");
    Ok(client)
}

/// Print resolved settings and the command `operation` would run.
fn print_dry_run(
    task: &TaskIdentity,
    settings: &ResolvedSettings,
    operation: Operation,
) -> Result<()> {
    let backend = Backend::for_settings(settings)?;

    println!("jobsub dry-run");
    println!("  task = {}", task.path());
    println!("  policy type = {}", settings.policy_type);
    println!("  submit type = {} ({})", settings.submit_type, backend.kind());
    println!("  host = {}", settings.host);
    println!("  job = {}", settings.paths.job.display());
    println!("  job at host = {}", settings.paths.job_at_host.display());
    println!("  output = {}", settings.paths.jobout.display());
    println!("  output at host = {}", settings.paths.jobout_at_host.display());
    if let Some(wrapper) = &settings.wrapper {
        println!("  wrapper = {wrapper}");
    }
    if let Some(reason) = &settings.force_complete {
        println!("  force complete: {reason}");
    }
    println!();

    println!("header ({}):", settings.header.len());
    for (key, value) in settings.header.iter() {
        println!("  {key}: {value}");
    }
    if !settings.trailer.is_empty() {
        println!("trailer ({}):", settings.trailer.len());
        for (key, value) in settings.trailer.iter() {
            println!("  {key}: {value}");
        }
    }
    println!();

    let cmd = match operation {
        Operation::Submit => Some(backend.submit_command(settings)),
        Operation::Status => task
            .submission_handle()
            .map(|h| backend.status_command(h)),
        Operation::Kill => task.submission_handle().map(|h| backend.kill_command(h)),
    };
    match cmd {
        Some(cmd) => println!("{operation} command: {}", settings.remote_wrapped(&cmd)),
        None => println!("{operation} command: <no submission id given>"),
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
