use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` was terminated by a signal")]
    Killed { command: String },
}

/// Runs host commands on behalf of the control loop.
#[async_trait]
pub(crate) trait CommandExecutor: Send + Sync {
    /// Runs `command` to completion and returns its exit status.
    async fn run(&self, command: &str) -> Result<i32, ExecError>;
}

/// Executes commands through `sh -c`.
#[derive(Debug, Default)]
pub(crate) struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<i32, ExecError> {
        debug!(command, "running host command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        status.code().ok_or_else(|| ExecError::Killed {
            command: command.to_string(),
        })
    }
}
