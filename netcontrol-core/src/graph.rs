//! Worker / port / queue registry.
//!
//! Queues, workers and ports reference each other through ids only. Workers
//! and ports live in ordered maps keyed by id and name, so cloning a graph for
//! a dry run is a plain value clone and iteration order never depends on the
//! order counters were reported in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{NetcontrolError, Result};
use crate::sample_window::SampleWindow;
use crate::snapshot::CounterSnapshot;

pub type WorkerId = u32;
pub type QueueId = u32;

/// A receive queue of a port, polled by one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    /// Name of the owning port.
    pub port: String,
    /// Worker whose counters report this queue. Stays on the origin worker
    /// while the queue is relabeled during a dry run.
    pub worker: WorkerId,
    /// Cumulative processing cycles spent on this queue.
    pub cycles: SampleWindow,
}

impl Queue {
    pub fn new(id: QueueId, port: impl Into<String>, worker: WorkerId, cycles: SampleWindow) -> Self {
        Self {
            id,
            port: port.into(),
            worker,
            cycles,
        }
    }
}

/// The queues of one port that are pinned to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub port: String,
    pub numa_id: u32,
    pub queues: BTreeMap<QueueId, Queue>,
    /// queue id -> worker the queue was last simulated onto
    pub rebalanced: BTreeMap<QueueId, WorkerId>,
}

impl Assignment {
    pub fn new(port: impl Into<String>, numa_id: u32) -> Self {
        Self {
            port: port.into(),
            numa_id,
            queues: BTreeMap::new(),
            rebalanced: BTreeMap::new(),
        }
    }
}

/// A polling core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub numa_id: u32,
    pub rx_cycles: SampleWindow,
    pub idle_cycles: SampleWindow,
    pub busy_cycles: SampleWindow,
    /// Percentage of cycles spent processing, see [`crate::load::worker_load`].
    pub load: f64,
    /// Port name -> queues of that port pinned here.
    pub assignments: BTreeMap<String, Assignment>,
}

impl Worker {
    pub fn new(id: WorkerId, numa_id: u32, intervals: usize) -> Self {
        Self {
            id,
            numa_id,
            rx_cycles: SampleWindow::new(intervals),
            idle_cycles: SampleWindow::new(intervals),
            busy_cycles: SampleWindow::new(intervals),
            load: 0.0,
            assignments: BTreeMap::new(),
        }
    }

    pub fn queue_count(&self) -> usize {
        self.assignments.values().map(|a| a.queues.len()).sum()
    }

    pub fn queues(&self) -> impl Iterator<Item = &Queue> {
        self.assignments.values().flat_map(|a| a.queues.values())
    }

    /// Attaches a queue, creating the port assignment when missing.
    pub fn add_queue(&mut self, port_numa: u32, queue: Queue) {
        self.assignments
            .entry(queue.port.clone())
            .or_insert_with(|| Assignment::new(queue.port.clone(), port_numa))
            .queues
            .insert(queue.id, queue);
    }

    pub fn remove_queue(&mut self, port: &str, queue_id: QueueId) -> Option<Queue> {
        self.assignments
            .get_mut(port)
            .and_then(|a| a.queues.remove(&queue_id))
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.assignments
            .get(port)
            .is_some_and(|a| !a.queues.is_empty())
    }
}

/// A polled network interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub id: u32,
    pub numa_id: u32,
    pub rx_packets: SampleWindow,
    pub rx_drops: SampleWindow,
    pub tx_packets: SampleWindow,
    pub tx_drops: SampleWindow,
}

impl Port {
    pub fn new(name: impl Into<String>, id: u32, numa_id: u32, intervals: usize) -> Self {
        Self {
            name: name.into(),
            id,
            numa_id,
            rx_packets: SampleWindow::new(intervals),
            rx_drops: SampleWindow::new(intervals),
            tx_packets: SampleWindow::new(intervals),
            tx_drops: SampleWindow::new(intervals),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataplaneGraph {
    intervals: usize,
    workers: BTreeMap<WorkerId, Worker>,
    ports: BTreeMap<String, Port>,
}

impl DataplaneGraph {
    pub fn new(intervals: usize) -> Self {
        Self {
            intervals: intervals.max(1),
            workers: BTreeMap::new(),
            ports: BTreeMap::new(),
        }
    }

    pub fn intervals(&self) -> usize {
        self.intervals
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn workers_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.values_mut()
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    pub fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(&id)
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    pub fn insert_worker(&mut self, worker: Worker) {
        self.workers.insert(worker.id, worker);
    }

    pub fn insert_port(&mut self, port: Port) {
        self.ports.insert(port.name.clone(), port);
    }

    pub fn queue_count(&self) -> usize {
        self.workers.values().map(Worker::queue_count).sum()
    }

    /// NUMA node of a port; falls back to the assignment's copy when the port
    /// was never reported on its own.
    pub fn port_numa(&self, port: &str) -> Option<u32> {
        self.ports.get(port).map(|p| p.numa_id).or_else(|| {
            self.workers
                .values()
                .find_map(|w| w.assignments.get(port).map(|a| a.numa_id))
        })
    }

    /// True once every worker and queue window holds a full set of readings.
    pub fn is_valid(&self) -> bool {
        self.workers.values().all(|w| {
            w.rx_cycles.is_valid()
                && w.idle_cycles.is_valid()
                && w.busy_cycles.is_valid()
                && w.queues().all(|q| q.cycles.is_valid())
        })
    }

    /// Pushes one snapshot into the sample windows, creating workers, ports
    /// and queues on first sight.
    ///
    /// The snapshot is authoritative: workers, ports and queues it no longer
    /// reports are dropped, so a queue re-pinned outside the daemon leaves its
    /// old worker and starts a fresh window on the new one.
    pub fn record(&mut self, snapshot: &CounterSnapshot) -> Result<()> {
        let intervals = self.intervals;

        for sample in &snapshot.ports {
            let port = self
                .ports
                .entry(sample.name.clone())
                .or_insert_with(|| Port::new(sample.name.clone(), sample.id, sample.numa_id, intervals));
            port.rx_packets.push(sample.rx_packets);
            port.rx_drops.push(sample.rx_drops);
            port.tx_packets.push(sample.tx_packets);
            port.tx_drops.push(sample.tx_drops);
        }

        for sample in &snapshot.workers {
            let worker = self
                .workers
                .entry(sample.id)
                .or_insert_with(|| Worker::new(sample.id, sample.numa_id, intervals));
            worker.rx_cycles.push(sample.rx_cycles);
            worker.idle_cycles.push(sample.idle_cycles);
            worker.busy_cycles.push(sample.busy_cycles);

            for queue_sample in &sample.queues {
                let numa_id = self
                    .ports
                    .get(&queue_sample.port)
                    .map(|p| p.numa_id)
                    .ok_or_else(|| {
                        NetcontrolError::MalformedSnapshot(format!(
                            "worker {} polls queue {} of unknown port {}",
                            sample.id, queue_sample.queue_id, queue_sample.port
                        ))
                    })?;

                let assignment = worker
                    .assignments
                    .entry(queue_sample.port.clone())
                    .or_insert_with(|| Assignment::new(queue_sample.port.clone(), numa_id));
                let queue = assignment
                    .queues
                    .entry(queue_sample.queue_id)
                    .or_insert_with(|| {
                        Queue::new(
                            queue_sample.queue_id,
                            queue_sample.port.clone(),
                            sample.id,
                            SampleWindow::new(intervals),
                        )
                    });
                queue.cycles.push(queue_sample.cycles);
            }
        }

        self.retain_reported(snapshot);
        Ok(())
    }

    fn retain_reported(&mut self, snapshot: &CounterSnapshot) {
        let ports: BTreeSet<&str> = snapshot.ports.iter().map(|p| p.name.as_str()).collect();
        self.ports.retain(|name, _| ports.contains(name.as_str()));

        let reported: BTreeMap<WorkerId, BTreeSet<(&str, QueueId)>> = snapshot
            .workers
            .iter()
            .map(|w| {
                let queues = w
                    .queues
                    .iter()
                    .map(|q| (q.port.as_str(), q.queue_id))
                    .collect();
                (w.id, queues)
            })
            .collect();

        self.workers.retain(|id, _| reported.contains_key(id));
        for worker in self.workers.values_mut() {
            let Some(queues) = reported.get(&worker.id) else {
                continue;
            };
            for assignment in worker.assignments.values_mut() {
                let port = assignment.port.as_str();
                assignment
                    .queues
                    .retain(|id, _| queues.contains(&(port, *id)));
            }
            worker
                .assignments
                .retain(|_, a| !a.queues.is_empty() || !a.rebalanced.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PortSample, QueueSample, WorkerSample};

    fn snapshot(busy: u64, queue_cycles: u64) -> CounterSnapshot {
        snapshot_on(2, busy, queue_cycles)
    }

    fn snapshot_on(worker: WorkerId, busy: u64, queue_cycles: u64) -> CounterSnapshot {
        CounterSnapshot {
            workers: vec![WorkerSample {
                id: worker,
                numa_id: 0,
                rx_cycles: busy,
                idle_cycles: 1000,
                busy_cycles: busy,
                queues: vec![QueueSample {
                    port: "dpdk0".into(),
                    queue_id: 0,
                    cycles: queue_cycles,
                }],
            }],
            ports: vec![PortSample {
                name: "dpdk0".into(),
                id: 1,
                numa_id: 0,
                rx_packets: 0,
                rx_drops: 0,
                tx_packets: 0,
                tx_drops: 0,
            }],
        }
    }

    #[test]
    fn record_builds_graph_and_fills_windows() {
        let mut graph = DataplaneGraph::new(1);
        graph.record(&snapshot(100, 40)).unwrap();
        assert!(!graph.is_valid());

        graph.record(&snapshot(300, 90)).unwrap();
        assert!(graph.is_valid());

        let worker = graph.worker(2).unwrap();
        assert_eq!(worker.queue_count(), 1);
        assert_eq!(worker.busy_cycles.delta(), 200);
        let queue = worker.queues().next().unwrap();
        assert_eq!(queue.cycles.delta(), 50);
        assert_eq!(queue.worker, 2);
        assert_eq!(graph.port_numa("dpdk0"), Some(0));
    }

    #[test]
    fn queue_on_unknown_port_is_rejected() {
        let mut bad = snapshot(1, 1);
        bad.ports.clear();
        let mut graph = DataplaneGraph::new(1);
        assert!(matches!(
            graph.record(&bad),
            Err(NetcontrolError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn queue_repinned_elsewhere_leaves_its_old_worker() {
        let mut graph = DataplaneGraph::new(1);
        graph.record(&snapshot_on(0, 100, 40)).unwrap();
        graph.record(&snapshot_on(0, 300, 90)).unwrap();
        assert_eq!(graph.worker(0).unwrap().queue_count(), 1);

        let mut moved = snapshot_on(1, 50, 120);
        moved.workers.insert(
            0,
            WorkerSample {
                id: 0,
                numa_id: 0,
                rx_cycles: 300,
                idle_cycles: 1200,
                busy_cycles: 300,
                queues: vec![],
            },
        );
        graph.record(&moved).unwrap();

        assert_eq!(graph.queue_count(), 1);
        assert_eq!(graph.worker(0).unwrap().queue_count(), 0);
        assert!(!graph.worker(0).unwrap().has_port("dpdk0"));
        let queue = graph.worker(1).unwrap().queues().next().unwrap();
        assert_eq!(queue.worker, 1);
        // the new owner starts a fresh window
        assert!(!graph.is_valid());
    }

    #[test]
    fn unreported_worker_is_dropped() {
        let mut graph = DataplaneGraph::new(1);
        graph.record(&snapshot_on(0, 100, 40)).unwrap();
        graph.record(&snapshot_on(3, 100, 40)).unwrap();

        assert_eq!(graph.worker_ids(), vec![3]);
        assert_eq!(graph.queue_count(), 1);
    }
}
