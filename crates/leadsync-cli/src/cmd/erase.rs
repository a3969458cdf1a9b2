//! Erase subcommand - clear one variable on a list of leads

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use leadsync_lemlist::{DEFAULT_ERASE_VARIABLE, MATCHED_IDS_FILE};

use super::Session;

#[derive(Args, Debug)]
pub struct EraseArgs {
    /// CSV with an `_id` column (default: <output dir>/matched_lead_ids.csv)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Variable to clear
    #[arg(long, default_value = DEFAULT_ERASE_VARIABLE)]
    pub variable: String,

    /// Resume at this 1-based data row of the input
    #[arg(long, default_value_t = 1)]
    pub start_row: usize,
}

pub fn run(args: EraseArgs, session: &Session) -> Result<ExitCode> {
    let input = args
        .input
        .unwrap_or_else(|| session.output_path(None, MATCHED_IDS_FILE));
    let ids = leadsync_lemlist::load_ids(&input)?;
    log::info!("Loaded {} lead IDs from {}", ids.len(), input.display());

    let api = session.connect()?;
    let pool = session.pool("erase");
    let summary = leadsync_lemlist::run_erase(&api, &pool, ids, args.start_row, &args.variable)?;

    if session.progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    let log = session.write_failures("erase", &summary.run.failures)?;
    session.exit_code(summary.run.failed, log.as_deref())
}
