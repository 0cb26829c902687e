// tests/submit_batch.rs

mod common;
use crate::common::{ControllerEvent, FakeRunner, Fixture, PolicyBuilder, RecordingController};
use crate::common::{init_tracing, task};

use std::error::Error;
use std::fs;

use jobsub::config::SubmissionPolicy;
use jobsub::errors::JobsubError;
use jobsub::submit::{SubmitOutcome, Submission};
use jobsub::types::{JobHandle, Operation};

type TestResult = Result<(), Box<dyn Error>>;

fn hpc_policy(submit_type: &str) -> SubmissionPolicy {
    PolicyBuilder::new("background")
        .submit_type("background", &[("HOST", "0")])
        .submit_type(
            "scalar",
            &[
                ("HOST", "1"),
                ("SUBMIT_TYPE", submit_type),
                ("WRAPPER", "srun"),
                ("SSH", "ssh hpc-login"),
                ("QUEUE", "#SBATCH --qos=nf"),
            ],
        )
        .with_tasks("scalar", &["ForecastModel", "ForecastModelRun"])
        .build()
}

#[tokio::test]
async fn slurm_submit_parses_last_token_and_wraps_remote_prefix() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = hpc_policy("slurm");
    let task = task("/exp/fc/ForecastModel");
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new().with_output("Submitted batch job 987654\n");
    let mut submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    let outcome = submission.submit().await?;
    assert_eq!(outcome, SubmitOutcome::Submitted(JobHandle::new("987654")));

    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].detached);
    assert_eq!(
        commands[0].cmd,
        format!(
            "ssh hpc-login \"sbatch {}\"",
            settings.paths.job_at_host.display()
        )
    );
    assert_eq!(
        commands[0].log,
        settings.paths.log_file(submission.task(), Operation::Submit)
    );

    assert!(controller.events().contains(&ControllerEvent::HandleUpdated {
        path: "/exp/fc/ForecastModel".to_string(),
        handle: "987654".to_string(),
    }));
    Ok(())
}

#[tokio::test]
async fn batch_header_carries_output_and_name_directives() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = hpc_policy("pbs");
    let task = task("/exp/fc/ForecastModelRun");
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new().with_output("4711.pbs-server\n");
    let mut submission = Submission::new(task, settings.clone(), &controller, &runner)?;
    submission.submit().await?;

    let script = fs::read_to_string(&settings.paths.job)?;
    let jobout = settings.paths.jobout_at_host.display().to_string();
    assert!(script.contains(&format!("#PBS -o {jobout}\n#PBS -e {jobout}\n#PBS -j oe\n")));
    // PBS job names are cut to 15 characters.
    assert!(script.contains("#PBS -N ForecastModelRu\n"));
    assert!(script.contains("#SBATCH --qos=nf\n"));
    assert!(script.contains("echo running on 1\nsrun ./model\n"));
    Ok(())
}

#[tokio::test]
async fn non_zero_submit_exit_is_recorded_in_submit_log() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = hpc_policy("slurm");
    let task = task("/exp/fc/ForecastModel");
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new()
        .with_output("sbatch: error: invalid partition\n")
        .with_exit_code(1);
    let mut submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    let err = submission.submit().await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Submit));
    assert!(matches!(
        err.root_cause(),
        JobsubError::CommandFailed {
            operation: Operation::Submit,
            code: 1
        }
    ));
    assert!(submission.task().submission_handle().is_none());

    let log = fs::read_to_string(settings.paths.log_file(submission.task(), Operation::Submit))?;
    assert!(log.starts_with("sbatch: error: invalid partition\n"));
    assert!(log.contains("Submission failed for /exp/fc/ForecastModel"));

    assert!(
        !controller
            .events()
            .iter()
            .any(|e| matches!(e, ControllerEvent::HandleUpdated { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn unexpected_submit_output_fails_to_parse() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = hpc_policy("slurm");
    let task = task("/exp/fc/ForecastModel");
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new().with_output("queued as 12\n");
    let mut submission = Submission::new(task, settings, &controller, &runner)?;

    let err = submission.submit().await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        JobsubError::JobIdParse {
            expected: 4,
            actual: 3,
            ..
        }
    ));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn shell_runner_submits_through_overridden_program() -> TestResult {
    use std::os::unix::fs::PermissionsExt;

    use jobsub::backend::{Backend, BatchSpec, ShellRunner};

    init_tracing();

    let fx = Fixture::new();
    let policy = PolicyBuilder::new("scalar")
        .submit_type("scalar", &[("HOST", "0"), ("SUBMIT_TYPE", "slurm")])
        .build();
    let task = task("/exp/fc/ForecastModel");
    let settings = fx.prepare(&policy, &task, false);

    let fake_sbatch = fx.file("fake-sbatch");
    fs::write(
        &fake_sbatch,
        "#!/bin/sh\necho \"sbatch: checking $1\"\necho \"Submitted batch job 55\"\n",
    )?;
    fs::set_permissions(&fake_sbatch, fs::Permissions::from_mode(0o755))?;

    let backend = Backend::Batch(BatchSpec::slurm().with_programs(
        fake_sbatch.display().to_string(),
        "squeue -j",
        "scancel",
    ));

    let controller = RecordingController::new();
    let runner = ShellRunner::new();
    let mut submission =
        Submission::new(task, settings.clone(), &controller, &runner)?.with_backend(backend);

    let outcome = submission.submit().await?;
    assert_eq!(outcome, SubmitOutcome::Submitted(JobHandle::new("55")));

    let log = fs::read_to_string(settings.paths.log_file(submission.task(), Operation::Submit))?;
    assert!(log.contains("Submitted batch job 55"));
    Ok(())
}
