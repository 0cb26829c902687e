// tests/job_operations.rs

mod common;
use crate::common::{ControllerEvent, FakeRunner, Fixture, PolicyBuilder, RecordingController};
use crate::common::init_tracing;

use std::error::Error;
use std::fs;

use jobsub::config::SubmissionPolicy;
use jobsub::errors::JobsubError;
use jobsub::submit::{KILL_MARKER, Submission};
use jobsub::task::TaskIdentity;
use jobsub::types::{ForcedState, JobHandle, Operation};

type TestResult = Result<(), Box<dyn Error>>;

fn slurm_policy() -> SubmissionPolicy {
    PolicyBuilder::new("scalar")
        .submit_type("scalar", &[("HOST", "1"), ("SUBMIT_TYPE", "slurm")])
        .build()
}

fn submitted(handle: Option<&str>) -> TaskIdentity {
    TaskIdentity::new("/exp/fc/Forecast", 2, "pw", Some("77"), handle).expect("valid task")
}

#[tokio::test]
async fn status_runs_status_command_and_keeps_handle() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = slurm_policy();
    let task = submitted(Some("5150"));
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new().with_output("JOBID STATE\n5150 RUNNING\n");
    let submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    let first = submission.status().await?;
    let second = submission.status().await?;

    assert_eq!(first.handle, JobHandle::new("5150"));
    assert_eq!(first.output, "JOBID STATE\n5150 RUNNING\n");
    assert_eq!(first, second);
    assert_eq!(
        submission.task().submission_handle(),
        Some(&JobHandle::new("5150"))
    );

    let commands = runner.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].cmd, "squeue -j 5150");
    assert_eq!(
        commands[0].log,
        settings.paths.log_file(submission.task(), Operation::Status)
    );
    assert!(controller.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn status_and_kill_need_a_handle() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = slurm_policy();
    let task = submitted(None);
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new();
    let submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    let status_err = submission.status().await.unwrap_err();
    assert!(matches!(status_err, JobsubError::StatusFailed { .. }));
    assert!(matches!(
        status_err.root_cause(),
        JobsubError::MissingJobHandle(Operation::Status)
    ));

    let kill_err = submission.kill().await.unwrap_err();
    assert!(matches!(kill_err, JobsubError::KillFailed { .. }));
    assert!(matches!(
        kill_err.root_cause(),
        JobsubError::MissingJobHandle(Operation::Kill)
    ));

    assert!(runner.commands().is_empty());
    assert!(controller.events().is_empty());

    let kill_log =
        fs::read_to_string(settings.paths.log_file(submission.task(), Operation::Kill))?;
    assert!(kill_log.contains("No job ID was provided for kill"));
    Ok(())
}

#[tokio::test]
async fn kill_logs_command_marks_output_and_aborts_task() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = slurm_policy();
    let task = submitted(Some("5150"));
    let settings = fx.prepare(&policy, &task, false);
    fs::create_dir_all(settings.paths.jobout.parent().expect("jobout has a parent"))?;
    fs::write(&settings.paths.jobout, "step 1 done\n")?;

    let controller = RecordingController::new();
    let runner = FakeRunner::new().with_output("scancel: job 5150 cancelled\n");
    let submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    submission.kill().await?;

    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].cmd, "scancel 5150");

    let kill_log =
        fs::read_to_string(settings.paths.log_file(submission.task(), Operation::Kill))?;
    assert_eq!(
        kill_log,
        format!(
            "Kill job {} with command:\nscancel 5150\nscancel: job 5150 cancelled\n",
            settings.paths.job_at_host.display()
        )
    );

    let jobout = fs::read_to_string(&settings.paths.jobout)?;
    assert_eq!(jobout, format!("step 1 done\n\n\n{KILL_MARKER}\n"));

    assert_eq!(
        controller.events(),
        vec![ControllerEvent::StateForced {
            path: "/exp/fc/Forecast".to_string(),
            state: ForcedState::Aborted,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn failed_kill_does_not_touch_the_task_state() -> TestResult {
    init_tracing();

    let fx = Fixture::new();
    let policy = slurm_policy();
    let task = submitted(Some("5150"));
    let settings = fx.prepare(&policy, &task, false);

    let controller = RecordingController::new();
    let runner = FakeRunner::new()
        .with_output("scancel: error: Invalid job id\n")
        .with_exit_code(1);
    let submission = Submission::new(task, settings.clone(), &controller, &runner)?;

    let err = submission.kill().await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        JobsubError::CommandFailed {
            operation: Operation::Kill,
            code: 1
        }
    ));
    assert!(controller.events().is_empty());
    assert!(!settings.paths.jobout.exists());
    Ok(())
}
