//! Proxy harvester CLI application
//!
//! Command-line interface for the harvesting and validation pipeline:
//! crawls configured proxy-list sources, validates candidates by fetching
//! through them, and prints the confirmed-working endpoints.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use proxy_harvester::cli::{handle_config, handle_run, Cli, Commands};
use proxy_harvester::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&cli);

    info!("proxy harvester v{} starting", env!("CARGO_PKG_VERSION"));

    let Cli { global, command } = cli;
    match command {
        Commands::Run(args) => handle_run(&global, args).await,
        Commands::Config(args) => handle_config(&global, args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("proxy_harvester={}", log_level).parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();
}
