//! talk2sql - Main entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use talk2sql::cli::{Cli, Command, run_schema_command};

/// Initialize tracing. `RUST_LOG` overrides the default filter.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("talk2sql=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Schema { output } => run_schema_command(&output),
        #[cfg(feature = "postgres")]
        Command::Ask {
            request,
            artifact,
            no_open,
        } => {
            let config = talk2sql::Config::from_env()?;
            talk2sql::cli::run_ask_command(config, &request, artifact, no_open).await
        }
        #[cfg(feature = "postgres")]
        Command::Seed { count } => talk2sql::cli::run_seed_command(count).await,
        #[cfg(feature = "postgres")]
        Command::List => talk2sql::cli::run_list_command().await,
        #[cfg(not(feature = "postgres"))]
        _ => anyhow::bail!("this command needs a database; rebuild with --features postgres"),
    }
}
