//! Offline subcommands over an export: `extract-ids` and `match`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use leadsync_lemlist::{MATCHED_IDS_FILE, UNIQUE_IDS_FILE};

use super::Session;

/// Default reference file for `match` and `lookup`
pub const CONTACTS_FILE: &str = "contact_phone_to_remove.csv";

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Export to read (default: latest all_leads_*.json in the output directory)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output CSV (default: <output dir>/unique_lead_ids.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Export to read (default: latest all_leads_*.json in the output directory)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Reference CSV with `email` and/or `linkedinUrl` columns
    #[arg(long)]
    pub contacts: Option<PathBuf>,

    /// Output CSV (default: <output dir>/matched_lead_ids.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Explicit input, or the newest export in the output directory
fn resolve_input(input: Option<PathBuf>, dir: &Path) -> Result<PathBuf> {
    match input {
        Some(path) => {
            anyhow::ensure!(path.exists(), "Input file not found: {}", path.display());
            Ok(path)
        }
        None => {
            let latest = leadsync_lemlist::latest_export(dir)?;
            log::info!("Using latest export {}", latest.display());
            Ok(latest)
        }
    }
}

pub fn run_extract(args: ExtractArgs, session: &Session) -> Result<ExitCode> {
    let input = resolve_input(args.input, &session.settings.output_dir)?;
    let output = args
        .output
        .unwrap_or_else(|| session.output_path(None, UNIQUE_IDS_FILE));

    let stage = session.progress.stage_line("extract");
    let summary = leadsync_lemlist::extract_unique_ids(&input, &output, stage)?;
    if session.progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run_match(args: MatchArgs, session: &Session) -> Result<ExitCode> {
    let input = resolve_input(args.input, &session.settings.output_dir)?;
    let contacts = args
        .contacts
        .unwrap_or_else(|| session.output_path(None, CONTACTS_FILE));
    anyhow::ensure!(
        contacts.exists(),
        "Contacts file not found: {}",
        contacts.display()
    );
    let output = args
        .output
        .unwrap_or_else(|| session.output_path(None, MATCHED_IDS_FILE));

    let stage = session.progress.stage_line("match");
    let summary = leadsync_lemlist::match_leads(&input, &contacts, &output, stage)?;
    if session.progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_input_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(Some(dir.path().join("missing.json")), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }

    #[test]
    fn falls_back_to_latest_export() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("all_leads_20240101_000000.json"), "[\n]\n").unwrap();
        std::fs::write(dir.path().join("all_leads_20240102_000000.json"), "[\n]\n").unwrap();
        assert_eq!(
            resolve_input(None, dir.path()).unwrap(),
            dir.path().join("all_leads_20240102_000000.json")
        );
    }
}
