// tests/lifecycle_session.rs

mod common;
use crate::common::{ControllerEvent, RecordingController};
use crate::common::{init_tracing, task, with_timeout};

use std::time::Duration;

use jobsub::errors::JobsubError;
use jobsub::lifecycle::{SessionOptions, run_session};

fn options() -> SessionOptions {
    SessionOptions {
        timeout: Duration::from_secs(3),
        exit_on_signal: false,
    }
}

// Sessions are process-wide, so tests in this file take turns.
static SESSION: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[tokio::test]
async fn session_reports_each_outcome_once() {
    init_tracing();
    let _turn = SESSION.lock().await;
    let task = task("/exp/fc/Forecast");

    // Success: init then complete.
    let mut controller = RecordingController::new();
    let value = with_timeout(run_session(&mut controller, &task, options(), async {
        Ok::<_, anyhow::Error>(42)
    }))
    .await
    .unwrap();
    assert_eq!(value, 42);
    let events = controller.events();
    assert!(matches!(events[0], ControllerEvent::Configured(ref c) if c.remote_id == 1234));
    assert_eq!(
        events[1..],
        [ControllerEvent::Init, ControllerEvent::Complete]
    );

    // Error: one abort, one log line, no complete.
    let mut controller = RecordingController::new();
    let err = with_timeout(run_session(&mut controller, &task, options(), async {
        Err::<(), _>(anyhow::anyhow!("model diverged"))
    }))
    .await
    .unwrap_err();
    assert!(err.to_string().contains("model diverged"));
    assert_eq!(
        controller.aborts(),
        vec!["Aborted with error: model diverged".to_string()]
    );
    assert_eq!(controller.log_lines(), vec!["/exp/fc/Forecast abort".to_string()]);
    assert!(!controller.events().contains(&ControllerEvent::Complete));

    // Unreachable server: the body never runs.
    let mut controller = RecordingController::new().failing_init();
    let err = with_timeout(run_session(&mut controller, &task, options(), async {
        Err::<(), _>(anyhow::anyhow!("body ran"))
    }))
    .await
    .unwrap_err();
    assert!(matches!(err, JobsubError::Controller(_)));
    assert!(controller.aborts().is_empty());
    assert!(!controller.events().contains(&ControllerEvent::Init));
}

#[cfg(unix)]
#[tokio::test]
async fn signal_in_body_is_reported_and_returned() {
    init_tracing();
    let _turn = SESSION.lock().await;
    let task = task("/exp/fc/Forecast");

    let mut controller = RecordingController::new();
    let err = with_timeout(run_session(&mut controller, &task, options(), async {
        jobsub::lifecycle::signals::reraise(libc::SIGUSR1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<_, anyhow::Error>(())
    }))
    .await
    .unwrap_err();

    assert!(matches!(err, JobsubError::Signalled(s) if s == libc::SIGUSR1));
    assert_eq!(
        controller.aborts(),
        vec![format!("Signal handler called with signal {}", libc::SIGUSR1)]
    );
    assert_eq!(controller.log_lines(), vec!["/exp/fc/Forecast abort".to_string()]);
    assert!(!controller.events().contains(&ControllerEvent::Complete));
}

#[cfg(unix)]
#[tokio::test]
async fn signal_while_reporting_complete_still_aborts() {
    init_tracing();
    let _turn = SESSION.lock().await;
    let task = task("/exp/fc/Forecast");

    let mut controller = RecordingController::new().signal_during_complete(libc::SIGUSR2);
    let err = with_timeout(run_session(&mut controller, &task, options(), async {
        Ok::<_, anyhow::Error>(())
    }))
    .await
    .unwrap_err();

    assert!(matches!(err, JobsubError::Signalled(s) if s == libc::SIGUSR2));
    assert_eq!(
        controller.aborts(),
        vec![format!("Signal handler called with signal {}", libc::SIGUSR2)]
    );
    assert_eq!(controller.log_lines(), vec!["/exp/fc/Forecast abort".to_string()]);

    // The guard was released, so a new session can start.
    let mut controller = RecordingController::new();
    let value = with_timeout(run_session(&mut controller, &task, options(), async {
        Ok::<_, anyhow::Error>(7)
    }))
    .await
    .unwrap();
    assert_eq!(value, 7);
}
