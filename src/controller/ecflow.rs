// src/controller/ecflow.rs

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ServerSettings;
use crate::controller::{ChildSettings, Controller, ControllerFuture, DEFAULT_TIMEOUT, TextLog};
use crate::errors::{JobsubError, Result};
use crate::types::{ForcedState, JobHandle};

pub const DEFAULT_PROGRAM: &str = "ecflow_client";

/// Talks to an ecFlow server through the `ecflow_client` program.
#[derive(Debug, Clone)]
pub struct EcflowClient {
    program: String,
    host: String,
    port: u16,
    timeout: Duration,
    child: Option<ChildSettings>,
    log: Option<TextLog>,
}

impl EcflowClient {
    pub fn new(server: &ServerSettings) -> Result<Self> {
        Ok(Self {
            program: DEFAULT_PROGRAM.to_string(),
            host: server.host.clone(),
            port: server.effective_port()?,
            timeout: DEFAULT_TIMEOUT,
            child: None,
            log: None,
        })
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn log(mut self, log: TextLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("ECF_HOST", &self.host)
            .env("ECF_PORT", self.port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(child) = &self.child {
            cmd.env("ECF_NAME", &child.path)
                .env("ECF_PASS", &child.credential)
                .env("ECF_TRYNO", child.try_number.to_string())
                .env("ECF_RID", child.remote_id.to_string())
                .env("ECF_TIMEOUT", child.timeout.as_secs().to_string());
        }
        cmd
    }

    async fn call(&self, args: Vec<String>) -> Result<()> {
        let timeout = self.child.as_ref().map_or(self.timeout, |c| c.timeout);
        debug!(program = %self.program, ?args, "calling server");

        let output = tokio::time::timeout(timeout, self.command(&args).output())
            .await
            .map_err(|_| JobsubError::ControllerTimeout(timeout))?
            .with_context(|| format!("running {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobsubError::Controller(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn require_child(&self) -> Result<&ChildSettings> {
        self.child.as_ref().ok_or_else(|| {
            JobsubError::Controller("client is not configured for a task".to_string())
        })
    }
}

impl Controller for EcflowClient {
    fn configure(&mut self, child: ChildSettings) {
        debug!(path = %child.path, try_number = child.try_number, "configuring server client");
        self.child = Some(child);
    }

    fn report_init(&self) -> ControllerFuture<'_> {
        Box::pin(async move {
            let rid = self.require_child()?.remote_id;
            self.call(vec![format!("--init={rid}")]).await
        })
    }

    fn report_complete(&self) -> ControllerFuture<'_> {
        Box::pin(async move {
            self.require_child()?;
            self.call(vec!["--complete".to_string()]).await
        })
    }

    fn report_abort<'a>(&'a self, reason: &'a str) -> ControllerFuture<'a> {
        Box::pin(async move {
            self.require_child()?;
            self.call(vec![format!("--abort={reason}")]).await
        })
    }

    fn update_handle<'a>(&'a self, path: &'a str, handle: &'a JobHandle) -> ControllerFuture<'a> {
        Box::pin(async move {
            info!(task = %path, %handle, "storing submission id on server");
            self.append_log(path)?;
            self.append_log(handle.as_str())?;
            self.call(vec![
                "--alter".to_string(),
                "add".to_string(),
                "variable".to_string(),
                "SUBMISSION_ID".to_string(),
                handle.to_string(),
                path.to_string(),
            ])
            .await
        })
    }

    fn force_state<'a>(&'a self, path: &'a str, state: ForcedState) -> ControllerFuture<'a> {
        Box::pin(async move {
            info!(task = %path, %state, "forcing task state");
            self.call(vec![format!("--force={state}"), path.to_string()])
                .await
        })
    }

    fn append_log(&self, text: &str) -> Result<()> {
        match &self.log {
            Some(log) => log.append(text),
            None => {
                warn!(%text, "no server log configured; line dropped");
                Ok(())
            }
        }
    }
}
