use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use netcontrol_core::{CounterSnapshot, DataplaneGraph};
use tokio::process::Command;
use tracing::trace;

/// Fills the next sample window slot of every worker, queue and port.
#[async_trait]
pub(crate) trait CounterSource: Send + Sync {
    async fn refresh(&mut self, graph: &mut DataplaneGraph) -> Result<()>;
}

/// Reads counters by running a stats command that prints one JSON
/// [`CounterSnapshot`] on stdout.
#[derive(Debug)]
pub(crate) struct CommandCounterSource {
    command: String,
}

impl CommandCounterSource {
    pub(crate) fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn snapshot(&self) -> Result<CounterSnapshot> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .with_context(|| format!("failed to run stats command `{}`", self.command))?;

        if !output.status.success() {
            return Err(anyhow!(
                "stats command `{}` failed with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        CounterSnapshot::from_json(&output.stdout)
            .with_context(|| format!("stats command `{}` printed an invalid snapshot", self.command))
    }
}

#[async_trait]
impl CounterSource for CommandCounterSource {
    async fn refresh(&mut self, graph: &mut DataplaneGraph) -> Result<()> {
        let snapshot = self.snapshot().await?;
        trace!(
            workers = snapshot.workers.len(),
            ports = snapshot.ports.len(),
            "counter snapshot read"
        );
        graph.record(&snapshot)?;
        Ok(())
    }
}
