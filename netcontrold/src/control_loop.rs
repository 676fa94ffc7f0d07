use anyhow::{anyhow, Context, Result};
use chrono::Local;
use metrics::{counter, gauge, histogram};
use netcontrol_core::{
    affinity::synthesize,
    load::{is_improvement, needs_rebalance, port_drop_ppm, update_loads, variance},
    simulate, DataplaneGraph, DryRun, RebalanceConfig,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::counter_source::CounterSource;
use crate::daemon_metrics::{
    ACCEPTED_CANDIDATES_TOTAL, APPLIED_OPTIMIZATIONS_TOTAL, DRY_RUNS_TOTAL,
    DRY_RUN_DURATION_SECONDS, LOAD_VARIANCE, WORKER_LOAD_PERCENT,
};
use crate::executor::CommandExecutor;
use crate::rebalance_state::RebalanceState;
use crate::service_configuration::{DebugConfig, ServiceConfiguration};

/// A batch of dry runs explored from the live graph.
#[derive(Debug)]
struct Batch {
    iteration: usize,
    best_variance: f64,
}

/// Samples the dataplane, runs dry runs when the load is unbalanced and
/// applies the best candidate once the rebalance interval allows it.
///
/// Every tick refreshes the counters once and runs at most one dry run, so a
/// batch of `max_dry_runs` spans as many ticks. A candidate beating the batch
/// baseline stays pending until more than `rebalance_interval /
/// sample_interval` ticks passed since the last apply.
pub(crate) struct ControlLoop<S, E> {
    config: RebalanceConfig,
    vswitch_ctl: String,
    debug: DebugConfig,
    state: Arc<RebalanceState>,
    source: S,
    executor: E,
    graph: DataplaneGraph,
    batch: Option<Batch>,
    candidate: Option<DryRun>,
    cancel: CancellationToken,
}

impl<S, E> ControlLoop<S, E>
where
    S: CounterSource,
    E: CommandExecutor,
{
    pub(crate) fn new(
        config: &ServiceConfiguration,
        state: Arc<RebalanceState>,
        source: S,
        executor: E,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: config.rebalance.clone(),
            vswitch_ctl: config.vswitch_ctl.clone(),
            debug: config.debug.clone(),
            state,
            source,
            executor,
            graph: DataplaneGraph::new(config.rebalance.window_intervals()),
            batch: None,
            candidate: None,
            cancel,
        }
    }

    /// Runs until the cancellation token fires or a fatal error occurs.
    pub(crate) async fn run(&mut self) -> Result<()> {
        info!(
            strategy = %self.config.strategy,
            sample_interval = self.config.sample_interval_secs,
            rebalance_interval = self.config.rebalance_interval_secs,
            dry_runs = self.config.effective_dry_runs(),
            window = self.graph.intervals(),
            "control loop started"
        );

        self.warm_up().await?;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.step().await?;
            if !self.pause(self.sample_interval()).await {
                break;
            }
        }

        info!("control loop stopped");
        Ok(())
    }

    fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.config.sample_interval_secs)
    }

    /// Sleeps for `duration`; false when cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Fills every window from scratch. The first reading only seeds the
    /// windows, so a window of `n` intervals takes `n + 1` refreshes.
    pub(crate) async fn warm_up(&mut self) -> Result<()> {
        let refreshes = self.graph.intervals() + 1;
        debug!(refreshes, "collecting warm-up samples");

        for n in 0..refreshes {
            self.refresh().await?;
            if n + 1 < refreshes && !self.pause(self.sample_interval()).await {
                return Ok(());
            }
        }
        update_loads(&mut self.graph);
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.source
            .refresh(&mut self.graph)
            .await
            .context("counter refresh failed")?;
        self.state.tick();
        Ok(())
    }

    /// One sampling tick.
    pub(crate) async fn step(&mut self) -> Result<()> {
        self.refresh().await?;
        update_loads(&mut self.graph);
        self.publish_loads();

        if !self.state.rebalance_enabled() && (self.batch.is_some() || self.state.pending_apply()) {
            info!("rebalance mode is off, dropping dry-run results");
            self.batch = None;
            self.candidate = None;
            self.state.set_pending_apply(false);
        }

        if self.batch.is_none() {
            if self.state.debug_enabled() {
                self.report_drops().await;
            }

            if self.state.pending_apply() {
                return self.try_apply().await;
            }

            if !self.state.rebalance_enabled()
                || !self.graph.is_valid()
                || !needs_rebalance(&self.graph, self.config.load_threshold)
            {
                return Ok(());
            }

            let best_variance = variance(&self.graph);
            info!(variance = best_variance, "load imbalance detected, starting dry runs");
            self.batch = Some(Batch {
                iteration: 0,
                best_variance,
            });
        }

        self.dry_run()?;

        let batch_done = self
            .batch
            .as_ref()
            .is_some_and(|b| b.iteration >= self.config.effective_dry_runs());
        if batch_done {
            self.batch = None;
            if self.state.pending_apply() {
                self.try_apply().await?;
            } else {
                debug!("no dry run beat the current placement");
                self.candidate = None;
            }
        }

        Ok(())
    }

    fn dry_run(&mut self) -> Result<()> {
        let Some(batch) = self.batch.as_mut() else {
            return Ok(());
        };

        let started = Instant::now();
        let dry = simulate(&self.graph, &self.config)?;
        histogram!(DRY_RUN_DURATION_SECONDS.name).record(started.elapsed().as_secs_f64());
        counter!(DRY_RUNS_TOTAL.name).increment(1);
        batch.iteration += 1;

        if is_improvement(batch.best_variance, dry.variance, self.config.min_improvement) {
            info!(
                iteration = batch.iteration,
                best = batch.best_variance,
                candidate = dry.variance,
                moves = dry.moves.len(),
                "dry run improves load variance"
            );
            counter!(ACCEPTED_CANDIDATES_TOTAL.name).increment(1);
            batch.best_variance = dry.variance;
            self.candidate = Some(dry);
            self.state.set_pending_apply(true);
        } else {
            debug!(
                iteration = batch.iteration,
                best = batch.best_variance,
                candidate = dry.variance,
                "dry run rejected"
            );
        }
        Ok(())
    }

    async fn try_apply(&mut self) -> Result<()> {
        if !self.state.apply_allowed() {
            debug!(
                ticks = self.state.ticks_since_apply(),
                required = self.state.ticks_required(),
                "candidate pending until the rebalance interval elapses"
            );
            return Ok(());
        }

        let Some(candidate) = self.candidate.take() else {
            self.state.set_pending_apply(false);
            return Ok(());
        };

        let Some(command) = synthesize(&candidate.graph, &self.vswitch_ctl) else {
            info!("candidate leaves every queue on non-isolated workers, nothing to apply");
            self.state.set_pending_apply(false);
            return Ok(());
        };

        info!(
            moves = candidate.moves.len(),
            variance = candidate.variance,
            command = %command,
            "applying rebalance"
        );
        let code = self
            .executor
            .run(&command)
            .await
            .context("failed to run the affinity command")?;
        if code != 0 {
            error!(code, command = %command, "affinity command failed");
            return Err(anyhow!("affinity command exited with status {code}"));
        }

        self.state.record_apply(Local::now()).await;
        counter!(APPLIED_OPTIMIZATIONS_TOTAL.name).increment(1);

        // let the vswitch settle before measuring the new placement
        if !self
            .pause(Duration::from_secs(self.config.vswitch_wait_secs))
            .await
        {
            return Ok(());
        }

        self.graph = DataplaneGraph::new(self.config.window_intervals());
        self.warm_up().await
    }

    /// Runs the debug callback once with the workers polling any port that
    /// drops more than the configured rate.
    async fn report_drops(&self) {
        let mut workers = BTreeSet::new();
        for port in self.graph.ports() {
            let ppm = port_drop_ppm(port);
            if ppm <= self.debug.pktdrop_min_ppm {
                continue;
            }

            warn!(port = %port.name, drop_ppm = ppm, "packet drops detected");
            workers.extend(
                self.graph
                    .workers()
                    .filter(|w| w.has_port(&port.name))
                    .map(|w| w.id),
            );
        }
        if workers.is_empty() {
            return;
        }

        let ids: Vec<String> = workers.iter().map(|id| id.to_string()).collect();
        let command = format!("{} {}", self.debug.callback, ids.join(" "));
        match self.executor.run(&command).await {
            Ok(0) => {}
            Ok(code) => warn!(code, command = %command, "debug callback failed"),
            Err(e) => warn!(error = %e, "debug callback could not run"),
        }
    }

    fn publish_loads(&self) {
        for worker in self.graph.workers() {
            gauge!(WORKER_LOAD_PERCENT.name, "worker" => worker.id.to_string()).set(worker.load);
        }
        gauge!(LOAD_VARIANCE.name).set(variance(&self.graph));
    }
}

#[cfg(test)]
impl<S, E> ControlLoop<S, E> {
    pub(crate) fn graph(&self) -> &DataplaneGraph {
        &self.graph
    }

    pub(crate) fn batch_iteration(&self) -> Option<usize> {
        self.batch.as_ref().map(|b| b.iteration)
    }

    pub(crate) fn has_candidate(&self) -> bool {
        self.candidate.is_some()
    }
}
