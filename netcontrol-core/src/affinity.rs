//! Turns a placement into the vswitch command that pins every queue to its
//! worker.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{DataplaneGraph, QueueId, WorkerId};

/// Builds the affinity command for `graph`, or `None` when no queue needs
/// pinning.
///
/// The lowest-id worker of every NUMA node is left unpinned so each node keeps
/// one general purpose polling core. Ports come out in name order and the
/// `queue:worker` pairs of a port are ordered by worker id, then queue id,
/// so the same placement always yields the same string.
pub fn synthesize(graph: &DataplaneGraph, vswitch_ctl: &str) -> Option<String> {
    let mut seen_numa = BTreeSet::new();
    let mut per_port: BTreeMap<&str, Vec<(WorkerId, QueueId)>> = BTreeMap::new();

    // workers() iterates by ascending id
    for worker in graph.workers() {
        if seen_numa.insert(worker.numa_id) {
            continue;
        }
        for (port, assignment) in &worker.assignments {
            for queue_id in assignment.queues.keys() {
                per_port
                    .entry(port.as_str())
                    .or_default()
                    .push((worker.id, *queue_id));
            }
        }
    }

    if per_port.is_empty() {
        return None;
    }

    let mut command = String::from(vswitch_ctl);
    for (port, mut pairs) in per_port {
        pairs.sort_unstable();
        let affinity = pairs
            .iter()
            .map(|(worker, queue)| format!("{queue}:{worker}"))
            .collect::<Vec<_>>()
            .join(",");
        command.push_str(&format!(
            " -- set Interface {port} other_config:pmd-rxq-affinity={affinity}"
        ));
    }

    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Queue, Worker};
    use crate::sample_window::SampleWindow;

    fn worker(id: WorkerId, numa_id: u32, queues: &[(&str, QueueId)]) -> Worker {
        let mut worker = Worker::new(id, numa_id, 1);
        for (port, queue) in queues {
            worker.add_queue(numa_id, Queue::new(*queue, *port, id, SampleWindow::new(1)));
        }
        worker
    }

    fn graph(workers: Vec<Worker>) -> DataplaneGraph {
        let mut graph = DataplaneGraph::new(1);
        for worker in workers {
            graph.insert_worker(worker);
        }
        graph
    }

    #[test]
    fn first_worker_of_each_numa_is_left_unpinned() {
        let graph = graph(vec![
            worker(0, 0, &[("dpdk0", 0)]),
            worker(1, 0, &[("dpdk0", 1), ("dpdk0", 2)]),
            worker(2, 1, &[("dpdk1", 0)]),
            worker(3, 1, &[("dpdk1", 1)]),
        ]);

        assert_eq!(
            synthesize(&graph, "ovs-vsctl").unwrap(),
            "ovs-vsctl -- set Interface dpdk0 other_config:pmd-rxq-affinity=1:1,2:1 \
             -- set Interface dpdk1 other_config:pmd-rxq-affinity=1:3"
        );
    }

    #[test]
    fn output_does_not_depend_on_insertion_order() {
        let workers = vec![
            worker(4, 0, &[("vhu1", 3)]),
            worker(7, 0, &[("vhu0", 1), ("vhu1", 0)]),
            worker(9, 0, &[("vhu0", 0), ("vhu1", 2)]),
        ];
        let forward = graph(workers.clone());
        let backward = graph(workers.into_iter().rev().collect());

        let command = synthesize(&forward, "ovs-vsctl").unwrap();
        assert_eq!(command, synthesize(&backward, "ovs-vsctl").unwrap());
        assert_eq!(
            command,
            "ovs-vsctl -- set Interface vhu0 other_config:pmd-rxq-affinity=1:7,0:9 \
             -- set Interface vhu1 other_config:pmd-rxq-affinity=0:7,2:9"
        );
    }

    #[test]
    fn nothing_to_pin_yields_none() {
        let graph = graph(vec![worker(0, 0, &[("dpdk0", 0)]), worker(5, 1, &[("dpdk1", 0)])]);
        assert_eq!(synthesize(&graph, "ovs-vsctl"), None);
        assert_eq!(synthesize(&DataplaneGraph::new(1), "ovs-vsctl"), None);
    }
}
