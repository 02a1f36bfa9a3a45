//! weft CLI binary entry point.

use clap::Parser;
use weft::cli::{commands, Cli, Commands};
use weft::config::WeftConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> weft::error::Result<()> {
    match cli.command {
        Commands::Replay(args) => {
            let config = WeftConfig::load(cli.config.as_deref())?;
            commands::handle_replay(args, config).await
        }
        Commands::Repair(args) => commands::handle_repair(args),
        Commands::Project(args) => commands::handle_project(args),
    }
}

fn init_tracing(verbose: u8) {
    // WEFT_LOG wins over RUST_LOG; -v raises the floor.
    let mut env_filter = tracing_subscriber::EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let level = match verbose {
        0 => None,
        1 => Some("weft=debug"),
        _ => Some("weft=trace"),
    };
    if let Some(directive) = level.and_then(|d| d.parse::<tracing_subscriber::filter::Directive>().ok()) {
        env_filter = env_filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
