use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Mode flags and apply bookkeeping shared by the control loop and the control
/// socket server. No invariant spans two fields, so each one is its own atomic.
#[derive(Debug)]
pub(crate) struct RebalanceState {
    rebalance_enabled: AtomicBool,
    debug_enabled: AtomicBool,
    pending_apply: AtomicBool,
    ticks_since_apply: AtomicU64,
    ticks_required: u64,
    /// Timestamps of applied optimizations, oldest first
    history: Mutex<Vec<DateTime<Local>>>,
}

impl RebalanceState {
    pub(crate) fn new(rebalance_enabled: bool, debug_enabled: bool, ticks_required: u64) -> Self {
        Self {
            rebalance_enabled: AtomicBool::new(rebalance_enabled),
            debug_enabled: AtomicBool::new(debug_enabled),
            pending_apply: AtomicBool::new(false),
            ticks_since_apply: AtomicU64::new(0),
            ticks_required,
            history: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn rebalance_enabled(&self) -> bool {
        self.rebalance_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_rebalance(&self, enabled: bool) {
        self.rebalance_enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.debug_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_debug(&self, enabled: bool) {
        self.debug_enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn pending_apply(&self) -> bool {
        self.pending_apply.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending_apply(&self, pending: bool) {
        self.pending_apply.store(pending, Ordering::Release);
    }

    pub(crate) fn tick(&self) -> u64 {
        self.ticks_since_apply.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn ticks_since_apply(&self) -> u64 {
        self.ticks_since_apply.load(Ordering::Acquire)
    }

    pub(crate) fn ticks_required(&self) -> u64 {
        self.ticks_required
    }

    /// True once strictly more ticks than required passed since the last apply.
    pub(crate) fn apply_allowed(&self) -> bool {
        self.ticks_since_apply() > self.ticks_required
    }

    /// Records an applied optimization and restarts the interval gate.
    pub(crate) async fn record_apply(&self, at: DateTime<Local>) {
        self.history.lock().await.push(at);
        self.ticks_since_apply.store(0, Ordering::Release);
        self.pending_apply.store(false, Ordering::Release);
    }

    /// Number of applied optimizations, reported as 0 while rebalance mode is off.
    pub(crate) async fn rebalance_count(&self) -> usize {
        if !self.rebalance_enabled() {
            return 0;
        }
        self.history.lock().await.len()
    }

    /// Multi-line status report served over the control socket.
    pub(crate) async fn status(&self) -> String {
        let on_off = |flag: bool| if flag { "on" } else { "off" };

        let mut status = format!(
            "debug mode: {}\nrebalance mode: {}\nrebalance events:\n",
            on_off(self.debug_enabled()),
            on_off(self.rebalance_enabled())
        );
        for (idx, at) in self.history.lock().await.iter().enumerate() {
            status.push_str(&format!(
                "{:<4}: {}\n",
                idx + 1,
                at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        status
    }
}
