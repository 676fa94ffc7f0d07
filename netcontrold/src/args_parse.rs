use clap::Parser;
use netcontrol_core::RebalanceStrategy;
use std::path::PathBuf;

/// Command line overrides; anything left unset keeps the config file value.
#[derive(Debug, Parser)]
#[command(name = "netcontrold")]
#[command(about = "Rebalances receive queues across polling worker cores")]
#[command(version)]
pub(crate) struct Args {
    /// Path to the YAML config file
    #[arg(long, short = 'c', default_value = "/etc/netcontrold/netcontrold.yml")]
    pub(crate) config_file: PathBuf,

    /// Seconds between two counter refreshes
    #[arg(long, short = 's')]
    pub(crate) sample_interval: Option<u64>,

    /// Minimum seconds between two applied optimizations
    #[arg(long)]
    pub(crate) rebalance_interval: Option<u64>,

    /// Maximum dry runs per batch
    #[arg(long)]
    pub(crate) rebalance_n: Option<usize>,

    /// Rebalancing strategy
    #[arg(long, value_enum)]
    pub(crate) strategy: Option<StrategyArg>,

    /// Start with rebalance mode on
    #[arg(long, conflicts_with = "no_rebalance")]
    pub(crate) rebalance: bool,

    /// Start with rebalance mode off
    #[arg(long)]
    pub(crate) no_rebalance: bool,

    /// Start with debug mode on
    #[arg(long, short = 'd')]
    pub(crate) debug: bool,

    /// Control socket path
    #[arg(long)]
    pub(crate) socket: Option<PathBuf>,

    /// Prometheus exporter address (host:port)
    #[arg(long)]
    pub(crate) prom_exporter: Option<String>,

    /// Log at debug level
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    pub(crate) verbose: bool,

    /// Log warnings and errors only
    #[arg(long, short = 'q')]
    pub(crate) quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub(crate) enum StrategyArg {
    IdleQueue,
    RoundRobin,
}

impl From<StrategyArg> for RebalanceStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::IdleQueue => RebalanceStrategy::IdleQueue,
            StrategyArg::RoundRobin => RebalanceStrategy::RoundRobin,
        }
    }
}

impl Args {
    /// Default log filter when `RUST_LOG` is not set.
    pub(crate) fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Rebalance mode requested on the command line, if any.
    pub(crate) fn rebalance_mode(&self) -> Option<bool> {
        match (self.rebalance, self.no_rebalance) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_parse() {
        let args = Args::try_parse_from([
            "netcontrold",
            "--config-file",
            "/tmp/ncd.yml",
            "-s",
            "5",
            "--strategy",
            "idle-queue",
            "--no-rebalance",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.config_file, PathBuf::from("/tmp/ncd.yml"));
        assert_eq!(args.sample_interval, Some(5));
        assert!(matches!(args.strategy, Some(StrategyArg::IdleQueue)));
        assert_eq!(args.rebalance_mode(), Some(false));
        assert_eq!(args.log_level(), "debug");
    }

    #[test]
    fn test_conflicting_modes_are_rejected() {
        assert!(Args::try_parse_from(["netcontrold", "--rebalance", "--no-rebalance"]).is_err());
        assert!(Args::try_parse_from(["netcontrold", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::try_parse_from(["netcontrold"]).unwrap();
        assert_eq!(args.rebalance_mode(), None);
        assert_eq!(args.log_level(), "info");
        assert!(args.strategy.is_none());
    }
}
