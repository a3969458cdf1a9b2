//! Offline passes over an export: unique `_id` extraction and contact matching.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use indicatif::ProgressBar;
use leadsync_core::{Dedup, MatchReference, Reconciler, ReferenceSet};

use crate::stats::{DedupSummary, MatchSummary};

pub const UNIQUE_IDS_FILE: &str = "unique_lead_ids.csv";
pub const MATCHED_IDS_FILE: &str = "matched_lead_ids.csv";

/// Every distinct `_id` of `input`, sorted, into `output`
pub fn extract_unique_ids(
    input: &Path,
    output: &Path,
    progress: ProgressBar,
) -> anyhow::Result<DedupSummary> {
    let start = Instant::now();
    log::info!("Extracting unique lead IDs from {}", input.display());

    let result = Reconciler::new(Dedup)
        .with_progress(progress)
        .run_file(input)
        .with_context(|| format!("Cannot read {}", input.display()))?;
    result
        .ids
        .save(output)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    Ok(DedupSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        stats: result.stats,
        unique: result.unique(),
        elapsed: start.elapsed(),
    })
}

/// `_id`s of leads whose email or LinkedIn URL appears in `contacts`
pub fn match_leads(
    input: &Path,
    contacts: &Path,
    output: &Path,
    progress: ProgressBar,
) -> anyhow::Result<MatchSummary> {
    let start = Instant::now();
    let reference = ReferenceSet::from_path(contacts)
        .with_context(|| format!("Cannot load contacts from {}", contacts.display()))?;
    log::info!(
        "Loaded {} emails and {} LinkedIn URLs from {}",
        reference.email_count(),
        reference.linkedin_count(),
        contacts.display()
    );
    if reference.is_empty() {
        log::warn!("{} has no usable contacts; nothing can match", contacts.display());
    }

    let result = Reconciler::new(MatchReference::new(&reference))
        .with_progress(progress)
        .run_file(input)
        .with_context(|| format!("Cannot read {}", input.display()))?;
    result
        .ids
        .save(output)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    Ok(MatchSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        reference_emails: reference.email_count(),
        reference_linkedin: reference.linkedin_count(),
        stats: result.stats,
        matched: result.unique(),
        elapsed: start.elapsed(),
    })
}
