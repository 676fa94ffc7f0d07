//! Netcontrol-Core
//!
//! Netcontrol-Core -- load accounting, dry-run rebalancing and the control
//! socket protocol shared by the netcontrol daemon and its operator CLI

pub mod errors;
pub use errors::{NetcontrolError, Result};

mod sample_window;
pub use sample_window::SampleWindow;

mod snapshot;
pub use snapshot::{CounterSnapshot, PortSample, QueueSample, WorkerSample};

pub mod graph;
pub use graph::{DataplaneGraph, Port, Queue, QueueId, Worker, WorkerId};

pub mod load;

pub mod config;
pub use config::{RebalanceConfig, RebalanceStrategy};

pub mod rebalancing;
pub use rebalancing::{simulate, DryRun, QueueMove};

pub mod affinity;

pub mod protocol;
pub use protocol::ControlCommand;
