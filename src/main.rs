use clap::Parser;

use inhaler_logger_lib::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inhaler_logger_lib::run(Cli::parse()).await
}
