//! Campaign export pipeline: list campaigns, export each concurrently, and
//! stream every lead into one `all_leads_<timestamp>.json` record stream.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use leadsync_core::{
    AtomicFile, FailureKind, Outcome, RecordStreamWriter, RunSummary, Transport, WorkerPool,
};

use crate::api::LemlistApi;
use crate::stats::ExportSummary;

pub const EXPORT_PREFIX: &str = "all_leads_";

/// `all_leads_<YYYYmmdd_HHMMSS>.json` for the current local time
pub fn export_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{EXPORT_PREFIX}{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Latest export in `dir` (greatest file name; timestamps sort lexicographically)
pub fn latest_export(dir: &Path) -> anyhow::Result<PathBuf> {
    let dir_str = dir
        .to_str()
        .context("Output directory path is not valid UTF-8")?;
    let pattern =
        Path::new(&glob::Pattern::escape(dir_str)).join(format!("{EXPORT_PREFIX}*.json"));
    let pattern_str = pattern
        .to_str()
        .context("Output directory path is not valid UTF-8")?;
    glob::glob(pattern_str)
        .context("Invalid export glob pattern")?
        .filter_map(Result::ok)
        .max()
        .with_context(|| format!("No {EXPORT_PREFIX}*.json files found in {}", dir.display()))
}

/// Export all campaigns into `output_path`.
///
/// Campaign failures are recorded and skipped. The file is only written when
/// at least one lead was exported.
pub fn run_export<T: Transport>(
    api: &LemlistApi<T>,
    pool: &WorkerPool,
    output_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let start = Instant::now();

    log::info!("Fetching campaign list");
    let campaigns = api.list_campaigns();
    if campaigns.is_empty() {
        log::warn!("No campaigns found");
        return Ok(ExportSummary {
            campaigns: 0,
            run: RunSummary::default(),
            leads: 0,
            output: None,
            bytes: 0,
            elapsed: start.elapsed(),
        });
    }
    log::info!("{} campaigns found", campaigns.len());

    let writer = Mutex::new(
        RecordStreamWriter::create(output_path)
            .with_context(|| format!("Cannot create {}", output_path.display()))?,
    );

    let total_campaigns = campaigns.len();
    let run = pool.run(campaigns, |campaign| {
        let outcome = api.export_campaign(campaign);
        let status = outcome.status;
        match outcome.result {
            Ok(leads) => {
                let mut w = writer.lock().expect("writer lock poisoned");
                for lead in &leads {
                    if let Err(e) = w.push(lead) {
                        return Outcome::failure(
                            outcome.key,
                            status,
                            FailureKind::Storage,
                            e.to_string(),
                        );
                    }
                }
                log::debug!("{}: {} leads", campaign.name, leads.len());
                Outcome::success(outcome.key, status, leads.len())
            }
            Err(failure) => {
                log::warn!("Skipping campaign '{}' ({}): {failure}", campaign.name, campaign.id);
                Outcome {
                    key: outcome.key,
                    status,
                    result: Err(failure),
                }
            }
        }
    })?;

    let writer = writer.into_inner().expect("writer lock poisoned");
    if let Some(storage) = run
        .failures
        .iter()
        .find(|f| f.kind == FailureKind::Storage)
    {
        discard(writer);
        anyhow::bail!("Cannot write {}: {}", output_path.display(), storage.message);
    }

    let leads: usize = run.payloads.iter().map(|(_, n)| n).sum();
    let (output, bytes) = if writer.count() == 0 {
        log::warn!("No leads retrieved, nothing written");
        discard(writer);
        (None, 0)
    } else {
        let (count, bytes) = writer
            .commit()
            .with_context(|| format!("Cannot write {}", output_path.display()))?;
        log::info!("{count} leads written to {}", output_path.display());
        (Some(output_path.to_path_buf()), bytes)
    };

    Ok(ExportSummary {
        campaigns: total_campaigns,
        run,
        leads,
        output,
        bytes,
        elapsed: start.elapsed(),
    })
}

fn discard(writer: RecordStreamWriter<AtomicFile>) {
    if let Err(e) = writer.discard() {
        log::warn!("Cannot remove partial export: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_format() {
        let t = chrono::Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(export_file_name(t), "all_leads_20240309_070501.json");
    }

    #[test]
    fn latest_export_picks_greatest_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "all_leads_20240101_000000.json",
            "all_leads_20240301_120000.json",
            "all_leads_20240201_235959.json",
            "other_20250101.json",
            "all_leads_20990101_000000.json.tmp",
        ] {
            std::fs::write(dir.path().join(name), "[\n]\n").unwrap();
        }
        assert_eq!(
            latest_export(dir.path()).unwrap(),
            dir.path().join("all_leads_20240301_120000.json")
        );
    }

    #[test]
    fn latest_export_in_bracketed_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("data [2024]*");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("all_leads_20240101_000000.json"), "[\n]\n").unwrap();
        std::fs::write(dir.join("all_leads_20240301_000000.json"), "[\n]\n").unwrap();
        assert_eq!(
            latest_export(&dir).unwrap(),
            dir.join("all_leads_20240301_000000.json")
        );
    }

    #[test]
    fn latest_export_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_export(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No all_leads_*.json"));
    }
}
