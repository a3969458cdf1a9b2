//! Lookup subcommand - lead IDs by email through the API

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use leadsync_lemlist::LOOKUP_IDS_FILE;

use super::Session;
use super::extract::CONTACTS_FILE;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Contacts CSV with an `email` column
    #[arg(long)]
    pub contacts: Option<PathBuf>,

    /// Query at most this many emails (after dedup and sort)
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Output CSV (default: <output dir>/matched_lead_ids_by_api.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: LookupArgs, session: &Session) -> Result<ExitCode> {
    let contacts = args
        .contacts
        .unwrap_or_else(|| session.output_path(None, CONTACTS_FILE));
    let output = args
        .output
        .unwrap_or_else(|| session.output_path(None, LOOKUP_IDS_FILE));

    let emails = leadsync_lemlist::load_emails(&contacts, args.limit)?;
    if emails.is_empty() {
        log::warn!("No emails in {}", contacts.display());
    }
    log::info!("Looking up {} emails from {}", emails.len(), contacts.display());

    let api = session.connect()?;
    let pool = session.pool("lookup");
    let summary = leadsync_lemlist::run_lookup(&api, &pool, emails, &output)?;

    if session.progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    let log = session.write_failures("lookup", &summary.failures)?;
    session.exit_code(summary.failed, log.as_deref())
}
