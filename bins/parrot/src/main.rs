mod config;
mod error;

use clap::Parser;
use config::Cli;

mod cmd;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = cmd::relay::run(cli).await {
        tracing::error!(error = %e, "parrot stopped");
        std::process::exit(1);
    }
}
