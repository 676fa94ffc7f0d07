use tracing::debug;

use crate::graph::{DataplaneGraph, Port, Worker};

/// Percentage of the worker's cycles spent processing packets over the window.
///
/// A worker that received nothing in the window is idle by definition, which
/// also covers a worker whose queues were relabeled away before it was
/// observed again.
pub fn worker_load(worker: &Worker) -> f64 {
    let rx = worker.rx_cycles.delta();
    let idle = worker.idle_cycles.delta();
    let busy = worker.busy_cycles.delta();
    let total = idle.saturating_add(busy);

    if rx == 0 || total == 0 {
        return 0.0;
    }

    (100.0 * busy as f64 / total as f64).clamp(0.0, 100.0)
}

pub fn update_loads(graph: &mut DataplaneGraph) {
    for worker in graph.workers_mut() {
        worker.load = worker_load(worker);
    }
}

/// Population variance of the worker loads.
pub fn variance(graph: &DataplaneGraph) -> f64 {
    let loads: Vec<f64> = graph.workers().map(|w| w.load).collect();
    if loads.is_empty() {
        return 0.0;
    }

    let mean = loads.iter().sum::<f64>() / loads.len() as f64;
    loads.iter().map(|load| (load - mean).powi(2)).sum::<f64>() / loads.len() as f64
}

/// Rebalancing is possible only while some, but not all, workers are loaded.
///
/// A worker counts as loaded when it is at or above `threshold` and has more
/// than one queue to give away. With every worker saturated there is no spare
/// capacity to move load into.
pub fn needs_rebalance(graph: &DataplaneGraph, threshold: f64) -> bool {
    let loaded = graph
        .workers()
        .filter(|w| w.load >= threshold && w.queue_count() > 1)
        .inspect(|w| {
            debug!(
                worker = w.id,
                load = w.load,
                threshold,
                "worker loaded above threshold"
            )
        })
        .count();

    loaded > 0 && loaded < graph.worker_count()
}

/// True when `candidate` beats `best` by more than `min_improvement`
/// (a fraction of `best`).
pub fn is_improvement(best: f64, candidate: f64, min_improvement: f64) -> bool {
    if candidate >= best {
        return false;
    }
    (best - candidate) / best > min_improvement
}

/// Dropped packets per million handled packets over the window.
pub fn port_drop_ppm(port: &Port) -> f64 {
    let packets = port.rx_packets.delta().saturating_add(port.tx_packets.delta());
    if packets == 0 {
        return 0.0;
    }
    let drops = port.rx_drops.delta().saturating_add(port.tx_drops.delta());
    1_000_000.0 * drops as f64 / packets as f64
}
