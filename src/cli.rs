use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zonelog")]
#[command(about = "MTA event log collector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the UDP collector, retention sweeper and query API
    Server(ServerArgs),
    /// Send one event datagram to a running collector
    Send(SendArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Configuration file (defaults to $ZONELOG_CONFIG or config/zonelog.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    /// Collector address
    #[arg(long, default_value = "127.0.0.1:31239")]
    pub to: SocketAddr,

    /// Entry id (queue id)
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub action: Option<String>,

    #[arg(long = "message-id")]
    pub message_id: Option<String>,

    /// Extra field as key=value; values that parse as JSON keep their type
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}
