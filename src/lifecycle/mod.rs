// src/lifecycle/mod.rs

//! Lifecycle session of a running job.
//!
//! [`run_session`] reports `init` to the controller, runs the job body and
//! then reports either `complete` or `abort`. Errors, panics and fatal
//! signals all end in exactly one `abort` report and one `<path> abort`
//! line in the shared log.

pub mod signals;

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::controller::{ChildSettings, Controller, DEFAULT_TIMEOUT};
use crate::errors::{JobsubError, Result};
use crate::task::TaskIdentity;

pub use signals::{SignalGuard, fatal_signals};

static ACTIVE: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
pub(crate) static TEST_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on each call to the controller.
    pub timeout: Duration,
    /// After a signal-driven abort, restore the previous handlers and
    /// re-raise the signal.
    pub exit_on_signal: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            exit_on_signal: true,
        }
    }
}

/// Marks the single lifecycle session of this process.
struct ActiveSession;

impl ActiveSession {
    fn acquire() -> Result<Self> {
        ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| JobsubError::SessionActive)?;
        Ok(ActiveSession)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

enum Ending<T> {
    Finished(T),
    Failed(String, JobsubError),
    /// The controller could not be told; nothing to abort.
    Unreported(JobsubError),
    Signalled(i32),
}

/// Run `body` as the job of `task`, reporting its lifecycle to `controller`.
///
/// Returns the body's value on success. On failure the body's error is
/// returned after the abort has been reported. A fatal signal that arrives
/// at any point of the session, including while the controller is being
/// called, is reported as an abort. The signal is then re-raised when
/// `options.exit_on_signal` is set; otherwise (or when the previous
/// disposition ignores it) `JobsubError::Signalled` is returned.
pub async fn run_session<C, F, T>(
    controller: &mut C,
    task: &TaskIdentity,
    options: SessionOptions,
    body: F,
) -> Result<T>
where
    C: Controller + ?Sized,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let _active = ActiveSession::acquire()?;
    controller.configure(ChildSettings::for_task(task, options.timeout));
    let controller: &C = controller;

    let (mut guard, mut signals) = SignalGuard::install(&fatal_signals())?;

    info!(task = %task.path(), try_number = task.try_number(), "job started");
    let mut ending = match until_signal(&mut signals, controller.report_init()).await {
        Err(signal) => Ending::Signalled(signal),
        Ok(Err(err)) => Ending::Unreported(err),
        Ok(Ok(())) => run_body(&mut signals, body).await,
    };

    ending = match ending {
        Ending::Finished(value) => match until_signal(&mut signals, controller.report_complete()).await {
            Err(signal) => Ending::Signalled(signal),
            Ok(Err(err)) => Ending::Unreported(err),
            Ok(Ok(())) => Ending::Finished(value),
        },
        other => other,
    };
    if let Ending::Finished(_) | Ending::Unreported(_) = ending {
        if let Ok(signal) = signals.try_recv() {
            ending = Ending::Signalled(signal);
        }
    }

    let mut aborted = false;
    match &ending {
        Ending::Failed(reason, err) => {
            abort(controller, task, reason).await;
            eprintln!("{}: {err:?}", task.path());
            aborted = true;
        }
        Ending::Signalled(signal) => {
            abort_on_signal(controller, task, *signal).await;
            aborted = true;
        }
        Ending::Finished(_) | Ending::Unreported(_) => {}
    }

    guard.restore();
    // The watcher has stopped, so every delivery up to here is queued.
    let late = signals.try_recv().ok();

    let signal = match (&ending, late) {
        (Ending::Signalled(signal), _) => Some(*signal),
        (_, Some(signal)) => {
            if !aborted {
                abort_on_signal(controller, task, signal).await;
            }
            Some(signal)
        }
        (_, None) => None,
    };
    if let Some(signal) = signal {
        if options.exit_on_signal {
            signals::reraise(signal);
        }
        return Err(JobsubError::Signalled(signal));
    }

    match ending {
        Ending::Finished(value) => {
            info!(task = %task.path(), "job complete");
            Ok(value)
        }
        Ending::Failed(_, err) | Ending::Unreported(err) => Err(err),
        Ending::Signalled(signal) => Err(JobsubError::Signalled(signal)),
    }
}

/// Await `fut` unless a fatal signal arrives first.
async fn until_signal<O>(
    signals: &mut mpsc::UnboundedReceiver<i32>,
    fut: impl Future<Output = O>,
) -> std::result::Result<O, i32> {
    tokio::select! {
        biased;

        Some(signal) = signals.recv() => Err(signal),
        out = fut => Ok(out),
    }
}

async fn run_body<F, T>(signals: &mut mpsc::UnboundedReceiver<i32>, body: F) -> Ending<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(body);
    let joined = match until_signal(signals, &mut handle).await {
        Ok(joined) => joined,
        Err(signal) => {
            handle.abort();
            return Ending::Signalled(signal);
        }
    };

    match joined {
        Ok(Ok(value)) => Ending::Finished(value),
        Ok(Err(err)) => Ending::Failed(format!("Aborted with error: {err:#}"), err.into()),
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            Ending::Failed(
                format!("Aborted with panic: {message}"),
                JobsubError::Other(anyhow::anyhow!("job panicked: {message}")),
            )
        }
        Err(join_err) => Ending::Failed(
            format!("Aborted with error: {join_err}"),
            JobsubError::Other(join_err.into()),
        ),
    }
}

async fn abort_on_signal<C>(controller: &C, task: &TaskIdentity, signal: i32)
where
    C: Controller + ?Sized,
{
    let reason = format!("Signal handler called with signal {signal}");
    abort(controller, task, &reason).await;
    eprintln!("{}: {reason}", task.path());
}

/// Report the abort and write the log line. Failures here are logged only,
/// the original cause matters more.
async fn abort<C: Controller + ?Sized>(controller: &C, task: &TaskIdentity, reason: &str) {
    error!(task = %task.path(), %reason, "job aborted");
    if let Err(err) = controller.report_abort(reason).await {
        warn!(task = %task.path(), error = %err, "failed to report abort");
    }
    if let Err(err) = controller.append_log(&format!("{} abort", task.path())) {
        warn!(task = %task.path(), error = %err, "failed to append abort to log");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
