//! Dry-run rebalancing simulators.
//!
//! Both strategies work on a private copy of the live graph: queues are
//! relabeled from one worker to another and the sample windows of both
//! workers are adjusted with the queue's own cycle history, so a load
//! computation on the copy estimates the placement without any measurement.

mod cursor;
mod idle_queue;
mod round_robin;


pub use idle_queue::rebalance_idle_queue;
pub use round_robin::rebalance_round_robin;

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::{RebalanceConfig, RebalanceStrategy};
use crate::errors::{NetcontrolError, Result};
use crate::graph::{Assignment, DataplaneGraph, QueueId, WorkerId};
use crate::load::{update_loads, variance, worker_load};

/// A single queue relabel proposed by a simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMove {
    pub port: String,
    pub queue: QueueId,
    pub from_worker: WorkerId,
    pub to_worker: WorkerId,
}

/// Outcome of one dry run
#[derive(Debug, Clone)]
pub struct DryRun {
    /// The simulated placement, loads already recomputed
    pub graph: DataplaneGraph,
    pub moves: Vec<QueueMove>,
    pub variance: f64,
}

/// Runs the configured strategy on a copy of `live`. The live graph is never
/// touched.
pub fn simulate(live: &DataplaneGraph, config: &RebalanceConfig) -> Result<DryRun> {
    let started = Instant::now();
    let mut graph = live.clone();

    let moves = match config.strategy {
        RebalanceStrategy::IdleQueue => rebalance_idle_queue(&mut graph, config.load_threshold)?,
        RebalanceStrategy::RoundRobin => rebalance_round_robin(&mut graph)?,
    };

    update_loads(&mut graph);
    let variance = variance(&graph);

    debug!(
        strategy = %config.strategy,
        moves = moves.len(),
        variance,
        elapsed_us = started.elapsed().as_micros() as u64,
        "dry run finished"
    );

    Ok(DryRun {
        graph,
        moves,
        variance,
    })
}

/// Relabels one queue from `from` to `to` and shifts its cycle history
/// between the two workers' windows.
pub(crate) fn relocate(
    graph: &mut DataplaneGraph,
    from: WorkerId,
    port: &str,
    queue_id: QueueId,
    to: WorkerId,
) -> Result<QueueMove> {
    if from == to {
        return Err(NetcontrolError::Graph(format!(
            "queue {queue_id} of port {port} relocated onto its own worker {from}"
        )));
    }
    if graph.worker(to).is_none() {
        return Err(NetcontrolError::Graph(format!("unknown destination worker {to}")));
    }
    let numa_id = graph
        .port_numa(port)
        .ok_or_else(|| NetcontrolError::Graph(format!("unknown port {port}")))?;

    let queue = graph
        .worker_mut(from)
        .and_then(|w| w.remove_queue(port, queue_id))
        .ok_or_else(|| {
            NetcontrolError::Graph(format!(
                "queue {queue_id} of port {port} not found on worker {from}"
            ))
        })?;
    let cycles = queue.cycles.clone();
    let origin = queue.worker;

    if let Some(src) = graph.worker_mut(from) {
        src.busy_cycles.sub_window(&cycles);
        src.idle_cycles.add_window(&cycles);
        src.load = worker_load(src);
    }

    if let Some(dst) = graph.worker_mut(to) {
        dst.busy_cycles.add_window(&cycles);
        dst.idle_cycles.sub_window(&cycles);
        dst.add_queue(numa_id, queue);
        dst.load = worker_load(dst);
    }

    // the origin keeps reporting the queue's counters until the move is real
    if let Some(origin_worker) = graph.worker_mut(origin) {
        origin_worker
            .assignments
            .entry(port.to_string())
            .or_insert_with(|| Assignment::new(port, numa_id))
            .rebalanced
            .insert(queue_id, to);
    }

    Ok(QueueMove {
        port: port.to_string(),
        queue: queue_id,
        from_worker: from,
        to_worker: to,
    })
}
