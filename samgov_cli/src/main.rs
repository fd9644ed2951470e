mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "samgov")]
#[command(about = "Fetch and inspect SAM.gov contract opportunities")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Directory holding run snapshots
    #[arg(long, default_value = ".sam_state", global = true)]
    state_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an opportunity fetch across the configured classification codes
    Fetch(commands::fetch::FetchArgs),
    /// Inspect persisted run snapshots
    History(commands::history::HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("samgov_lib=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, &cli.state_dir, &format).await?,
        Commands::History(args) => commands::history::run(args, &cli.state_dir, &format)?,
    }

    Ok(())
}
