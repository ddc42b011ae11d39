//! Invocation of the external deployment script

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::ScriptConfig;
use crate::error::DispatchError;
use crate::webhook::WebhookEvent;

/// First positional argument of every invocation, telling the script what triggered it.
pub const TRIGGER_KIND: &str = "webhook";

/// Exit status and captured output of one script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// `-1` when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the deployment step for a validated event
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, event: &WebhookEvent) -> Result<CommandResult, DispatchError>;
}

/// Positional arguments handed to the script, in order:
/// trigger kind, owner, application, action.
pub fn script_args(event: &WebhookEvent) -> Vec<String> {
    vec![
        TRIGGER_KIND.to_string(),
        event.owner_name.clone(),
        event.app_name.clone(),
        event.action.as_str().to_string(),
    ]
}

/// Dispatcher that spawns the configured script as a child process.
///
/// Arguments are passed as an argument vector, never through a shell, so
/// payload values cannot inject commands.
#[derive(Debug, Clone)]
pub struct ScriptDispatcher {
    script: PathBuf,
    interpreter: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ScriptDispatcher {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            interpreter: None,
            working_dir: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self {
            script: config.path.clone(),
            interpreter: config.interpreter.clone(),
            working_dir: config.working_dir.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full argument vector, program first.
    pub fn argv(&self, event: &WebhookEvent) -> Vec<String> {
        let mut argv = Vec::with_capacity(6);
        if let Some(interpreter) = &self.interpreter {
            argv.push(interpreter.clone());
        }
        argv.push(self.script.to_string_lossy().into_owned());
        argv.extend(script_args(event));
        argv
    }

    fn command(&self, event: &WebhookEvent) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.script);
                cmd
            }
            None => Command::new(&self.script),
        };
        cmd.args(script_args(event))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // the child must not outlive a timed-out wait
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Dispatcher for ScriptDispatcher {
    async fn dispatch(&self, event: &WebhookEvent) -> Result<CommandResult, DispatchError> {
        let cwd = self
            .working_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        info!("Running (cwd = '{}'): {:?}", cwd, self.argv(event));

        let child = self.command(event).spawn().map_err(|e| {
            error!("Deployment script failed to start: {}", e);
            DispatchError::Spawn(e)
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    error!("Deployment script timed out after {:?}", limit);
                    DispatchError::TimedOut(limit)
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(DispatchError::Io)?;

        let result = CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("Deployment script exited with {}", result.exit_code);
        Ok(result)
    }
}
