mod args_parse;
mod control_loop;
mod control_server;
mod counter_source;
mod daemon_metrics;
mod executor;
mod rebalance_state;
mod service_configuration;


use std::{fs::read_to_string, sync::Arc};

use crate::{
    args_parse::Args,
    control_loop::ControlLoop,
    control_server::ControlServer,
    counter_source::CommandCounterSource,
    daemon_metrics::init_metrics,
    executor::ShellExecutor,
    rebalance_state::RebalanceState,
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging, RUST_LOG wins over --verbose / --quiet
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(&args.config_file)
        .with_context(|| format!("failed to read {}", args.config_file.display()))?;
    let load_config: LoadConfiguration = serde_yaml::from_str(&config_content)?;

    // Attempt to transform LoadConfiguration into ServiceConfiguration
    let mut service_config: ServiceConfiguration = load_config.try_into()?;
    service_config.apply_args(&args)?;

    init_metrics(service_config.prom_exporter)?;

    let state = Arc::new(RebalanceState::new(
        service_config.rebalance.enabled,
        service_config.debug.enabled,
        service_config.rebalance.ticks_between_applies(),
    ));
    let cancel = CancellationToken::new();

    let server = ControlServer::bind(&service_config.socket_path, state.clone())?;
    let server_task = tokio::spawn(server.run(cancel.clone()));

    let mut control_loop = ControlLoop::new(
        &service_config,
        state,
        CommandCounterSource::new(service_config.stats_command.clone()),
        ShellExecutor,
        cancel.clone(),
    );
    let loop_task = tokio::spawn(async move { control_loop.run().await });

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        shutdown.cancel();
    });

    let loop_result = loop_task.await.context("control loop task panicked")?;
    // a fatal loop error still closes the control socket
    cancel.cancel();
    server_task.await.context("control server task panicked")??;

    if let Err(e) = &loop_result {
        error!(error = %e, "control loop terminated");
    }
    loop_result
}
