use tracing::{debug, info};

use super::cursor::SerpentineCursor;
use super::{relocate, QueueMove};
use crate::errors::Result;
use crate::graph::{DataplaneGraph, QueueId, WorkerId};

struct Candidate {
    worker: WorkerId,
    port: String,
    queue: QueueId,
    numa_id: u32,
    cycles: u64,
}

/// Deals every queue, heaviest first, across the workers of its port's NUMA
/// node in serpentine worker order.
///
/// There is no load ceiling on the destination: the strategy spreads load
/// evenly instead of filling idle workers up to the threshold. A queue whose
/// turn lands on its current worker stays where it is, so an already balanced
/// placement produces no moves.
pub fn rebalance_round_robin(graph: &mut DataplaneGraph) -> Result<Vec<QueueMove>> {
    let mut candidates: Vec<Candidate> = graph
        .workers()
        .flat_map(|w| {
            w.assignments.values().flat_map(move |a| {
                a.queues.values().map(move |q| Candidate {
                    worker: w.id,
                    port: a.port.clone(),
                    queue: q.id,
                    numa_id: a.numa_id,
                    cycles: q.cycles.delta(),
                })
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.cycles
            .cmp(&a.cycles)
            .then(a.worker.cmp(&b.worker))
            .then_with(|| a.port.cmp(&b.port))
            .then(a.queue.cmp(&b.queue))
    });

    let mut cursor = SerpentineCursor::new(graph.worker_ids());
    let mut moves = Vec::new();

    for candidate in candidates {
        let target = cursor.next_matching(|id| {
            graph
                .worker(id)
                .is_some_and(|w| w.numa_id == candidate.numa_id)
        });
        let Some(target) = target else {
            debug!(
                port = %candidate.port,
                queue = candidate.queue,
                numa_id = candidate.numa_id,
                "no worker on this numa node, queue stays"
            );
            continue;
        };
        if target == candidate.worker {
            continue;
        }

        info!(
            queue = candidate.queue,
            port = %candidate.port,
            cycles = candidate.cycles,
            from_worker = candidate.worker,
            to_worker = target,
            "moving queue"
        );
        moves.push(relocate(
            graph,
            candidate.worker,
            &candidate.port,
            candidate.queue,
            target,
        )?);
    }

    Ok(moves)
}
