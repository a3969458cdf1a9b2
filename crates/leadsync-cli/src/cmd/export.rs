//! Export subcommand - every campaign's leads into one record stream

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::Session;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory (default: [output] dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExportArgs, session: &Session) -> Result<ExitCode> {
    let output_dir = args
        .output
        .unwrap_or_else(|| session.settings.output_dir.clone());
    leadsync_core::cleanup_tmp_files(&output_dir)?;
    let output_path = output_dir.join(leadsync_lemlist::export_file_name(chrono::Local::now()));

    let api = session.connect()?;
    log::info!("Exporting all campaigns");
    log::info!("  Output: {}", output_path.display());

    let stage = session.progress.stage_line("campaigns");
    stage.set_message("listing campaigns");
    let pool = session.pool("export");
    let result = leadsync_lemlist::run_export(&api, &pool, &output_path);
    stage.finish_and_clear();
    let summary = result?;

    if session.progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    let log = session.write_failures("export", &summary.run.failures)?;
    session.exit_code(summary.run.failed, log.as_deref())
}
