use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 4] = [
    DRY_RUNS_TOTAL,
    ACCEPTED_CANDIDATES_TOTAL,
    APPLIED_OPTIMIZATIONS_TOTAL,
    CONTROL_COMMANDS_TOTAL,
];
pub(crate) const GAUGES: [Metric; 2] = [WORKER_LOAD_PERCENT, LOAD_VARIANCE];
pub(crate) const HISTOGRAMS: [Metric; 1] = [DRY_RUN_DURATION_SECONDS];

// WORKER Metrics --------------------------

pub(crate) const WORKER_LOAD_PERCENT: Metric = Metric {
    name: "netcontrol_worker_load_percent",
    description: "Share of polling cycles spent processing packets per worker (0-100)",
};

pub(crate) const LOAD_VARIANCE: Metric = Metric {
    name: "netcontrol_load_variance",
    description: "Population variance of worker loads. Lower is better, 0 is perfectly balanced.",
};

// REBALANCING Metrics --------------------------

pub(crate) const DRY_RUNS_TOTAL: Metric = Metric {
    name: "netcontrol_dry_runs_total",
    description: "Total number of dry-run simulations executed",
};

pub(crate) const ACCEPTED_CANDIDATES_TOTAL: Metric = Metric {
    name: "netcontrol_accepted_candidates_total",
    description: "Total number of dry runs whose variance beat the best known placement",
};

pub(crate) const APPLIED_OPTIMIZATIONS_TOTAL: Metric = Metric {
    name: "netcontrol_applied_optimizations_total",
    description: "Total number of affinity commands applied to the dataplane",
};

pub(crate) const DRY_RUN_DURATION_SECONDS: Metric = Metric {
    name: "netcontrol_dry_run_duration_seconds",
    description: "Duration of one dry-run simulation in seconds",
};

// CONTROL Metrics --------------------------

pub(crate) const CONTROL_COMMANDS_TOTAL: Metric = Metric {
    name: "netcontrol_control_commands_total",
    description: "Total control socket commands served",
};

pub(crate) fn init_metrics(prom_addr: Option<std::net::SocketAddr>) -> Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus recorder")?;
    }

    for name in COUNTERS {
        register_counter(name)
    }

    for name in GAUGES {
        register_gauge(name)
    }

    for name in HISTOGRAMS {
        register_histogram(name)
    }

    Ok(())
}

/// Registers a counter with the given name.
fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

/// Registers a gauge with the given name.
fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

/// Registers a histogram with the given name.
fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
