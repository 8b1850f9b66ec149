use clap::Parser;
use llm_dock_providers::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Providers => cli::providers::run().await,
        Command::Probe(args) => cli::probe::run(args).await,
        Command::Models(args) => cli::models::run(args).await,
        Command::Chat(args) => cli::chat::run(args).await,
        Command::Estimate(args) => cli::estimate::run(args).await,
    }
}
