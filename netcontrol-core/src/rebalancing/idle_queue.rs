use std::cmp::Ordering;
use tracing::{debug, info};

use super::cursor::IdleCursor;
use super::{relocate, QueueMove};
use crate::errors::Result;
use crate::graph::{DataplaneGraph, QueueId, WorkerId};
use crate::load::update_loads;

/// Moves lightly loaded queues off busy workers onto idle workers.
///
/// ## Algorithm:
/// 1. Workers at or above `threshold` are busy, the others are idle
///    candidates, least loaded first.
/// 2. For every port of a busy worker, the queue with the smallest share of
///    the worker's busy cycles moves, leaving the heavy queues with more
///    cycles on the busy worker.
/// 3. The destination is taken from the idle pool in round-robin order and
///    must sit on the port's NUMA node; a port without a same-node candidate
///    is skipped.
/// 4. An idle worker that reaches the threshold leaves the pool.
///
/// A busy worker always keeps at least one queue.
pub fn rebalance_idle_queue(graph: &mut DataplaneGraph, threshold: f64) -> Result<Vec<QueueMove>> {
    if graph.worker_count() <= 1 {
        debug!("not enough workers to rebalance");
        return Ok(vec![]);
    }

    update_loads(graph);

    let mut by_load: Vec<(WorkerId, f64)> = graph.workers().map(|w| (w.id, w.load)).collect();
    by_load.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let (busy, mut idle): (Vec<_>, Vec<_>) =
        by_load.into_iter().partition(|(_, load)| *load >= threshold);
    let busy: Vec<WorkerId> = busy.into_iter().map(|(id, _)| id).collect();
    // least loaded first, ties by id
    idle.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    let mut idle: Vec<WorkerId> = idle.into_iter().map(|(id, _)| id).collect();

    debug!(busy = ?busy, idle = ?idle, threshold, "partitioned workers by load");

    let mut moves = Vec::new();
    let mut cursor = IdleCursor::default();
    let mut current: Option<WorkerId> = None;

    for worker_id in busy {
        let ports: Vec<String> = match graph.worker(worker_id) {
            Some(worker) => worker.assignments.keys().cloned().collect(),
            None => continue,
        };

        for port in ports {
            let Some(worker) = graph.worker(worker_id) else {
                break;
            };
            let Some(assignment) = worker.assignments.get(&port) else {
                continue;
            };
            if assignment.queues.is_empty() {
                continue;
            }
            // leave at least one queue so the busy worker is not made idle
            if worker.queue_count() <= 1 {
                continue;
            }

            let numa_id = assignment.numa_id;
            let on_numa = |id: WorkerId| graph.worker(id).is_some_and(|w| w.numa_id == numa_id);
            if !current.is_some_and(&on_numa) {
                current = cursor.next_matching(&idle, &on_numa);
            }
            let Some(target) = current else {
                debug!(port = %port, numa_id, "no idle worker on this numa node");
                continue;
            };

            let busy_total = worker.busy_cycles.delta();
            let candidates = assignment.queues.values().map(|q| (q.id, q.cycles.delta()));
            let Some(queue_id) = least_loaded_queue(candidates, busy_total) else {
                continue;
            };

            info!(
                queue = queue_id,
                port = %port,
                from_worker = worker_id,
                to_worker = target,
                "moving queue into idle worker"
            );
            moves.push(relocate(graph, worker_id, &port, queue_id, target)?);

            let target_load = graph.worker(target).map(|w| w.load).unwrap_or_default();
            if target_load >= threshold {
                info!(worker = target, load = target_load, "removing worker from idle pool");
                cursor.remove(&mut idle, target);
                current = None;
            }
        }
    }

    Ok(moves)
}

/// Queue with the smallest share of the worker's busy cycles; ties go to the
/// lowest queue id.
fn least_loaded_queue(queues: impl Iterator<Item = (QueueId, u64)>, busy_total: u64) -> Option<QueueId> {
    queues
        .map(|(id, cycles)| {
            let share = if busy_total == 0 {
                cycles as f64
            } else {
                cycles as f64 * 100.0 / busy_total as f64
            };
            (id, share)
        })
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)))
        .map(|(id, _)| id)
}
