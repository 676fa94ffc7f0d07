use anyhow::{Context, Result};
use netcontrol_core::RebalanceConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::args_parse::Args;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Rebalancing policy
    #[serde(default)]
    pub(crate) rebalance: RebalanceConfig,
    /// Control socket configuration
    #[serde(default)]
    pub(crate) control: ControlConfig,
    /// Dataplane collaborators
    pub(crate) dataplane: DataplaneConfig,
    /// Packet drop debugging
    #[serde(default)]
    pub(crate) debug: DebugConfig,
    /// Prometheus exporter (optional)
    pub(crate) prometheus: Option<PrometheusConfig>,
}

/// validated daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServiceConfiguration {
    pub(crate) rebalance: RebalanceConfig,
    /// Unix socket served to the operator CLI
    pub(crate) socket_path: PathBuf,
    /// Command printing one JSON counter snapshot per invocation
    pub(crate) stats_command: String,
    /// Program receiving the `-- set Interface ...` arguments
    pub(crate) vswitch_ctl: String,
    pub(crate) debug: DebugConfig,
    pub(crate) prom_exporter: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ControlConfig {
    pub(crate) socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/netcontrold.sock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DataplaneConfig {
    /// Command printing one JSON counter snapshot
    pub(crate) stats_command: String,
    /// vswitch control program
    #[serde(default = "default_vswitch_ctl")]
    pub(crate) vswitch_ctl: String,
}

fn default_vswitch_ctl() -> String {
    "ovs-vsctl".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct DebugConfig {
    /// Start with debug mode on
    pub(crate) enabled: bool,
    /// Program called with the ids of workers polling a dropping port
    pub(crate) callback: String,
    /// Drop rate (packets per million) above which the callback fires
    pub(crate) pktdrop_min_ppm: f64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            callback: "ncd_cb_pktdrop".to_string(),
            pktdrop_min_ppm: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PrometheusConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        if config.dataplane.stats_command.trim().is_empty() {
            return Err(anyhow::anyhow!("dataplane.stats_command must not be empty"));
        }

        let prom_exporter = match config.prometheus {
            Some(prom) => Some(
                format!("{}:{}", prom.host, prom.port)
                    .parse()
                    .context("Failed to create prom_exporter")?,
            ),
            None => None,
        };

        let service_config = ServiceConfiguration {
            rebalance: config.rebalance,
            socket_path: config.control.socket_path,
            stats_command: config.dataplane.stats_command,
            vswitch_ctl: config.dataplane.vswitch_ctl,
            debug: config.debug,
            prom_exporter,
        };
        service_config.validate()?;

        Ok(service_config)
    }
}

impl ServiceConfiguration {
    pub(crate) fn validate(&self) -> Result<()> {
        self.rebalance
            .validate()
            .context("invalid rebalance configuration")?;
        if self.debug.pktdrop_min_ppm < 0.0 {
            return Err(anyhow::anyhow!("debug.pktdrop_min_ppm must not be negative"));
        }
        Ok(())
    }

    /// Overrides file values with the ones given on the command line.
    pub(crate) fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(secs) = args.sample_interval {
            self.rebalance.sample_interval_secs = secs;
        }
        if let Some(secs) = args.rebalance_interval {
            self.rebalance.rebalance_interval_secs = secs;
        }
        if let Some(n) = args.rebalance_n {
            self.rebalance.max_dry_runs = n;
        }
        if let Some(strategy) = args.strategy {
            self.rebalance.strategy = strategy.into();
        }
        if let Some(enabled) = args.rebalance_mode() {
            self.rebalance.enabled = enabled;
        }
        if args.debug {
            self.debug.enabled = true;
        }
        if let Some(socket) = &args.socket {
            self.socket_path = socket.clone();
        }
        if let Some(prom_exporter) = &args.prom_exporter {
            let prom_address: SocketAddr = prom_exporter.parse().context(format!(
                "Failed to parse into Socket address: {}",
                prom_exporter
            ))?;
            self.prom_exporter = Some(prom_address);
        }

        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use netcontrol_core::RebalanceStrategy;

    const MINIMAL: &str = r#"
dataplane:
  stats_command: "ncd-stats --json"
"#;

    const FULL: &str = r#"
rebalance:
  enabled: false
  strategy: idle_queue
  sample_interval_secs: 5
  rebalance_interval_secs: 30
  max_dry_runs: 3
  load_threshold: 90.0
  min_improvement: 0.1
control:
  socket_path: /tmp/ncd.sock
dataplane:
  stats_command: "ncd-stats --json"
  vswitch_ctl: /usr/bin/ovs-vsctl
debug:
  enabled: true
  callback: /usr/local/bin/dump-pmd
  pktdrop_min_ppm: 100
prometheus:
  host: 127.0.0.1
  port: 9040
"#;

    fn parse(yaml: &str) -> Result<ServiceConfiguration> {
        let load: LoadConfiguration = serde_yaml::from_str(yaml)?;
        load.try_into()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.rebalance, RebalanceConfig::default());
        assert_eq!(config.socket_path, PathBuf::from("/var/run/netcontrold.sock"));
        assert_eq!(config.vswitch_ctl, "ovs-vsctl");
        assert_eq!(config.debug, DebugConfig::default());
        assert!(config.prom_exporter.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = parse(FULL).unwrap();
        assert!(!config.rebalance.enabled);
        assert_eq!(config.rebalance.strategy, RebalanceStrategy::IdleQueue);
        assert_eq!(config.rebalance.max_dry_runs, 3);
        assert_eq!(config.rebalance.load_threshold, 90.0);
        // unset fields keep their defaults
        assert_eq!(config.rebalance.samples, 6);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/ncd.sock"));
        assert_eq!(config.vswitch_ctl, "/usr/bin/ovs-vsctl");
        assert!(config.debug.enabled);
        assert_eq!(config.debug.pktdrop_min_ppm, 100.0);
        assert_eq!(
            config.prom_exporter,
            Some("127.0.0.1:9040".parse().unwrap())
        );
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = parse(include_str!("../../config/netcontrold.yml")).unwrap();
        assert_eq!(config.rebalance, RebalanceConfig::default());
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(parse("rebalance:\n  strategy: idle_queue\n").is_err());
        assert!(parse("dataplane:\n  stats_command: \"\"\n").is_err());
        assert!(parse(&format!("{MINIMAL}rebalance:\n  load_threshold: 150\n")).is_err());
        assert!(parse(&format!("{MINIMAL}rebalance:\n  strategy: fastest\n")).is_err());
    }

    #[test]
    fn test_command_line_overrides() {
        let mut config = parse(MINIMAL).unwrap();
        let args = Args::try_parse_from([
            "netcontrold",
            "--sample-interval",
            "2",
            "--rebalance-n",
            "4",
            "--strategy",
            "idle-queue",
            "--no-rebalance",
            "--debug",
            "--socket",
            "/tmp/other.sock",
            "--prom-exporter",
            "0.0.0.0:9100",
        ])
        .unwrap();

        config.apply_args(&args).unwrap();

        assert_eq!(config.rebalance.sample_interval_secs, 2);
        assert_eq!(config.rebalance.max_dry_runs, 4);
        assert_eq!(config.rebalance.strategy, RebalanceStrategy::IdleQueue);
        assert!(!config.rebalance.enabled);
        assert!(config.debug.enabled);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
        assert_eq!(config.prom_exporter, Some("0.0.0.0:9100".parse().unwrap()));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = parse(MINIMAL).unwrap();
        let args = Args::try_parse_from(["netcontrold", "--prom-exporter", "not-an-addr"]).unwrap();
        assert!(config.apply_args(&args).is_err());

        let args = Args::try_parse_from(["netcontrold", "--sample-interval", "0"]).unwrap();
        assert!(config.apply_args(&args).is_err());
    }
}
