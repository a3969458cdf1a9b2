//! Resolve lead IDs by email through the API.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use leadsync_core::reference::{EMAIL_COLUMN, read_unique_column};
use leadsync_core::{ResultSet, Transport, WorkerPool};

use crate::api::{LemlistApi, LookupResult};
use crate::stats::LookupSummary;

pub const LOOKUP_IDS_FILE: &str = "matched_lead_ids_by_api.csv";

/// Distinct emails of the `email` column, sorted, at most `limit` of them
pub fn load_emails(path: &Path, limit: Option<usize>) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open {}", path.display()))?;
    let mut emails = read_unique_column(file, EMAIL_COLUMN)
        .with_context(|| format!("Cannot read emails from {}", path.display()))?;
    if let Some(limit) = limit.filter(|&n| n < emails.len()) {
        log::info!("Limiting lookup to the first {limit} of {} emails", emails.len());
        emails.truncate(limit);
    }
    Ok(emails)
}

/// Query every email and save the distinct lead IDs found to `output`
pub fn run_lookup<T: Transport>(
    api: &LemlistApi<T>,
    pool: &WorkerPool,
    emails: Vec<String>,
    output: &Path,
) -> anyhow::Result<LookupSummary> {
    let start = Instant::now();
    let queried = emails.len();

    let run = pool.run(emails, |email| api.lookup_email(email))?;

    let mut found = 0;
    let mut not_found = 0;
    let mut ids = Vec::new();
    for (_, result) in run.payloads {
        match result {
            LookupResult::Found(lead_ids) => {
                found += 1;
                ids.extend(lead_ids);
            }
            LookupResult::NotFound => not_found += 1,
        }
    }

    let ids = ResultSet::from_unsorted(ids);
    ids.save(output)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    Ok(LookupSummary {
        queried,
        found,
        not_found,
        failed: run.failed,
        skipped: run.skipped,
        unique_ids: ids.len(),
        output: output.to_path_buf(),
        failures: run.failures,
        elapsed: start.elapsed(),
    })
}
