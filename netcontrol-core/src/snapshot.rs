use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// One structured reading of the dataplane counters.
///
/// Produced by the counter collaborator (the daemon runs a stats command that
/// prints this document as JSON) and recorded into a
/// [`DataplaneGraph`](crate::DataplaneGraph). All counters are cumulative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    #[serde(default)]
    pub workers: Vec<WorkerSample>,
    #[serde(default)]
    pub ports: Vec<PortSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSample {
    pub id: u32,
    pub numa_id: u32,
    pub rx_cycles: u64,
    pub idle_cycles: u64,
    pub busy_cycles: u64,
    #[serde(default)]
    pub queues: Vec<QueueSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSample {
    pub port: String,
    pub queue_id: u32,
    pub cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSample {
    pub name: String,
    pub id: u32,
    pub numa_id: u32,
    #[serde(default)]
    pub rx_packets: u64,
    #[serde(default)]
    pub rx_drops: u64,
    #[serde(default)]
    pub tx_packets: u64,
    #[serde(default)]
    pub tx_drops: u64,
}

impl CounterSnapshot {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
