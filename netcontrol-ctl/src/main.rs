mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::Response;
use netcontrol_core::ControlCommand;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "netcontrol-ctl")]
#[command(about = "Inspect and control a running netcontrold")]
#[command(version)]
struct Cli {
    /// Control socket of the daemon
    #[arg(long, env = "NETCONTROL_SOCKET", default_value = "/var/run/netcontrold.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Commands {
    #[command(about = "Turn packet drop debugging on")]
    DebugOn,

    #[command(about = "Turn packet drop debugging off")]
    DebugOff,

    #[command(about = "Allow the daemon to apply new queue placements")]
    RebalanceOn,

    #[command(about = "Stop applying new queue placements")]
    RebalanceOff,

    #[command(about = "Print the number of applied optimizations")]
    RebalanceCount,

    #[command(about = "Print mode flags and the rebalance history")]
    Status,
}

impl From<Commands> for ControlCommand {
    fn from(command: Commands) -> Self {
        match command {
            Commands::DebugOn => ControlCommand::DebugOn,
            Commands::DebugOff => ControlCommand::DebugOff,
            Commands::RebalanceOn => ControlCommand::RebalanceOn,
            Commands::RebalanceOff => ControlCommand::RebalanceOff,
            Commands::RebalanceCount => ControlCommand::RebalanceCount,
            Commands::Status => ControlCommand::Status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match client::send(&cli.socket, cli.command.into()).await? {
        Response::Ack => println!("ok"),
        Response::Data(payload) if payload.ends_with('\n') => print!("{payload}"),
        Response::Data(payload) => println!("{payload}"),
    }

    Ok(())
}
