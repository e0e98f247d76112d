mod cli;
mod client;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use zonelog::config::Config;
use zonelog::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = match args.config {
                Some(path) => Config::load_from_path(path)?,
                None => Config::load()?,
            };
            init_tracing(&config.log.level);
            server::run(config).await?
        }
        Commands::Send(args) => {
            init_tracing("info");
            client::send(args).await?
        }
    }

    Ok(())
}
