//! The `history` subcommand: inspects and maintains run snapshots.

use anyhow::Result;
use clap::Args;

use samgov_lib::state::DEFAULT_KEEP;
use samgov_lib::StateFileManager;

use crate::output::{print_json_value, print_snapshot_list, OutputFormat};

#[derive(Args)]
pub struct HistoryArgs {
    /// List every stored snapshot instead of just the latest
    #[arg(long)]
    pub list: bool,

    /// Delete all but the N most recent snapshots
    #[arg(long, value_name = "N", conflicts_with = "clear")]
    pub rotate: Option<usize>,

    /// Delete every snapshot
    #[arg(long)]
    pub clear: bool,
}

pub fn run(args: &HistoryArgs, state_dir: &str, format: &OutputFormat) -> Result<()> {
    let manager = StateFileManager::local(state_dir);

    if args.clear {
        let deleted = manager.clear();
        println!("Deleted {} snapshot(s)", deleted);
        return Ok(());
    }

    if let Some(keep) = args.rotate {
        let keep = if keep == 0 { DEFAULT_KEEP } else { keep };
        let deleted = manager.rotate(keep);
        println!("Deleted {} snapshot(s), kept the {} most recent", deleted, keep);
        return Ok(());
    }

    if args.list {
        let all = manager.all();
        if all.is_empty() {
            println!("No run snapshots in {}", state_dir);
            return Ok(());
        }
        match format {
            OutputFormat::Json => print_json_value(&serde_json::to_value(&all)?)?,
            OutputFormat::Table => print_snapshot_list(&all),
        }
        return Ok(());
    }

    match manager.load_latest() {
        None => println!("No run snapshots in {}", state_dir),
        Some(snapshot) => match format {
            OutputFormat::Json => print_json_value(&serde_json::to_value(&snapshot)?)?,
            OutputFormat::Table => {
                println!("Last run: {}", snapshot.timestamp);
                println!("Params:  {}", snapshot.params);
                println!("Summary: {}", snapshot.summary);
                if snapshot.failed_codes.is_empty() {
                    println!("Failed codes: none");
                } else {
                    println!("Failed codes: {}", snapshot.failed_codes.join(", "));
                }
            }
        },
    }
    Ok(())
}
