//! Run summaries and their reporting.
//!
//! Every command ends with one summary:
//! - `ExportSummary`: campaigns exported, leads written
//! - `DedupSummary` / `MatchSummary`: reconciliation of an export
//! - `LookupSummary`: lead IDs found by email
//! - `EraseSummary`: variable erase results
//!
//! TTY runs print a table on stderr; non-TTY runs log one line.

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use leadsync_core::{FailedItem, ReconcileStats, RunSummary, fmt_mb, fmt_num};

fn table(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title)
                .fg(Color::Cyan)
                .add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table
}

fn row(table: &mut Table, label: &str, value: impl Into<String>) {
    table.add_row(vec![Cell::new(label), Cell::new(value.into())]);
}

fn failed_cell(table: &mut Table, failed: usize) {
    let cell = if failed > 0 {
        Cell::new(fmt_num(failed)).fg(Color::Red)
    } else {
        Cell::new("0")
    };
    table.add_row(vec![Cell::new("Failed"), cell]);
}

fn path_or_none(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map_or_else(|| "(not written)".to_string(), |p| p.display().to_string())
}

// =============================================================================
// Export
// =============================================================================

#[derive(Debug)]
pub struct ExportSummary {
    pub campaigns: usize,
    /// Per-campaign results; payload is the lead count
    pub run: RunSummary<usize>,
    pub leads: usize,
    pub output: Option<PathBuf>,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ExportSummary {
    /// Names of campaigns that failed
    pub fn failed_campaigns(&self) -> Vec<&str> {
        self.run.failures.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn format_table(&self) -> String {
        let mut t = table("Export");
        row(&mut t, "Campaigns", fmt_num(self.campaigns));
        row(&mut t, "Exported", fmt_num(self.run.ok));
        failed_cell(&mut t, self.run.failed);
        if self.run.skipped > 0 {
            row(&mut t, "Skipped", fmt_num(self.run.skipped));
        }
        row(&mut t, "Leads", fmt_num(self.leads));
        row(&mut t, "Output", path_or_none(&self.output));
        row(&mut t, "Size", fmt_mb(self.bytes));
        row(&mut t, "Time", format!("{:.1}s", self.elapsed.as_secs_f64()));
        t.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
        let failed = self.failed_campaigns();
        if !failed.is_empty() {
            eprintln!("{} campaign(s) failed: {}", failed.len(), failed.join(", "));
        }
    }

    pub fn log(&self) {
        log::info!(
            "export: {}/{} campaigns ({} failed), {} leads, {} [{:.1}s]",
            fmt_num(self.run.ok),
            fmt_num(self.campaigns),
            fmt_num(self.run.failed),
            fmt_num(self.leads),
            fmt_mb(self.bytes),
            self.elapsed.as_secs_f64()
        );
        let failed = self.failed_campaigns();
        if !failed.is_empty() {
            log::warn!("{} campaign(s) failed: {}", failed.len(), failed.join(", "));
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

#[derive(Debug)]
pub struct DedupSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: ReconcileStats,
    pub unique: usize,
    pub elapsed: Duration,
}

impl DedupSummary {
    /// Identified records beyond the first occurrence of their `_id`
    pub fn duplicates(&self) -> usize {
        self.stats
            .records
            .saturating_sub(self.unique + self.stats.missing_id)
    }

    pub fn format_table(&self) -> String {
        let mut t = table("Extract IDs");
        row(&mut t, "Input", self.input.display().to_string());
        row(&mut t, "Total leads", fmt_num(self.stats.records));
        row(&mut t, "Unique _id", fmt_num(self.unique));
        row(&mut t, "Duplicates", fmt_num(self.duplicates()));
        if self.stats.missing_id > 0 {
            row(&mut t, "Missing _id", fmt_num(self.stats.missing_id));
        }
        if self.stats.malformed > 0 {
            row(&mut t, "Malformed lines", fmt_num(self.stats.malformed));
        }
        row(&mut t, "Output", self.output.display().to_string());
        row(&mut t, "Time", format!("{:.1}s", self.elapsed.as_secs_f64()));
        t.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "extract-ids: {} leads, {} unique, {} duplicates, {} missing _id -> {} [{:.1}s]",
            fmt_num(self.stats.records),
            fmt_num(self.unique),
            fmt_num(self.duplicates()),
            fmt_num(self.stats.missing_id),
            self.output.display(),
            self.elapsed.as_secs_f64()
        );
    }
}

#[derive(Debug)]
pub struct MatchSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub reference_emails: usize,
    pub reference_linkedin: usize,
    pub stats: ReconcileStats,
    pub matched: usize,
    pub elapsed: Duration,
}

impl MatchSummary {
    pub fn format_table(&self) -> String {
        let mut t = table("Match");
        row(&mut t, "Input", self.input.display().to_string());
        row(&mut t, "Emails to match", fmt_num(self.reference_emails));
        row(&mut t, "LinkedIn to match", fmt_num(self.reference_linkedin));
        row(&mut t, "Leads scanned", fmt_num(self.stats.records));
        row(&mut t, "Matched by email", fmt_num(self.stats.matched_by_email));
        row(&mut t, "Matched by LinkedIn", fmt_num(self.stats.matched_by_linkedin));
        row(&mut t, "Unique matched IDs", fmt_num(self.matched));
        if self.stats.malformed > 0 {
            row(&mut t, "Malformed lines", fmt_num(self.stats.malformed));
        }
        row(&mut t, "Output", self.output.display().to_string());
        row(&mut t, "Time", format!("{:.1}s", self.elapsed.as_secs_f64()));
        t.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "match: {} leads scanned, {} by email, {} by LinkedIn, {} unique -> {} [{:.1}s]",
            fmt_num(self.stats.records),
            fmt_num(self.stats.matched_by_email),
            fmt_num(self.stats.matched_by_linkedin),
            fmt_num(self.matched),
            self.output.display(),
            self.elapsed.as_secs_f64()
        );
    }
}

// =============================================================================
// Lookup
// =============================================================================

#[derive(Debug)]
pub struct LookupSummary {
    pub queried: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unique_ids: usize,
    pub output: PathBuf,
    pub failures: Vec<FailedItem>,
    pub elapsed: Duration,
}

impl LookupSummary {
    pub fn format_table(&self) -> String {
        let mut t = table("Lookup by email");
        row(&mut t, "Emails queried", fmt_num(self.queried));
        row(&mut t, "Found", fmt_num(self.found));
        row(&mut t, "Not found (404)", fmt_num(self.not_found));
        failed_cell(&mut t, self.failed);
        if self.skipped > 0 {
            row(&mut t, "Skipped", fmt_num(self.skipped));
        }
        row(&mut t, "Unique lead IDs", fmt_num(self.unique_ids));
        row(&mut t, "Output", self.output.display().to_string());
        row(&mut t, "Time", format!("{:.1}s", self.elapsed.as_secs_f64()));
        t.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "lookup: {} emails, {} found, {} not found, {} failed, {} unique IDs [{:.1}s]",
            fmt_num(self.queried),
            fmt_num(self.found),
            fmt_num(self.not_found),
            fmt_num(self.failed),
            fmt_num(self.unique_ids),
            self.elapsed.as_secs_f64()
        );
    }
}

// =============================================================================
// Erase
// =============================================================================

#[derive(Debug)]
pub struct EraseSummary {
    pub variable: String,
    pub loaded: usize,
    pub start_row: usize,
    pub run: RunSummary<()>,
    pub elapsed: Duration,
}

impl EraseSummary {
    pub fn format_table(&self) -> String {
        let mut t = table(&format!("Erase '{}'", self.variable));
        row(&mut t, "IDs loaded", fmt_num(self.loaded));
        if self.start_row > 1 {
            row(&mut t, "Resumed at row", fmt_num(self.start_row));
        }
        row(&mut t, "Processed", fmt_num(self.run.total()));
        row(&mut t, "Success", fmt_num(self.run.ok));
        failed_cell(&mut t, self.run.failed);
        if self.run.skipped > 0 {
            row(&mut t, "Skipped", fmt_num(self.run.skipped));
        }
        row(&mut t, "Time", format!("{:.1}s", self.elapsed.as_secs_f64()));
        t.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "erase {}: {} processed, {} ok, {} failed, {} skipped [{:.1}s]",
            self.variable,
            fmt_num(self.run.total()),
            fmt_num(self.run.ok),
            fmt_num(self.run.failed),
            fmt_num(self.run.skipped),
            self.elapsed.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadsync_core::FailureKind;

    #[test]
    fn dedup_duplicates() {
        let s = DedupSummary {
            input: "in.json".into(),
            output: "out.csv".into(),
            stats: ReconcileStats {
                records: 5,
                missing_id: 1,
                ..Default::default()
            },
            unique: 3,
            elapsed: Duration::ZERO,
        };
        assert_eq!(s.duplicates(), 1);
        let table = s.format_table();
        assert!(table.contains("Missing _id"));
        assert!(!table.contains("Malformed"));
    }

    #[test]
    fn export_table_lists_failures() {
        let s = ExportSummary {
            campaigns: 3,
            run: RunSummary {
                ok: 2,
                failed: 1,
                skipped: 0,
                failures: vec![FailedItem {
                    key: "Spring promo".into(),
                    status: Some(500),
                    kind: FailureKind::Rejected,
                    message: "HTTP 500".into(),
                }],
                payloads: vec![("A".into(), 10), ("B".into(), 5)],
            },
            leads: 15,
            output: None,
            bytes: 0,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(s.failed_campaigns(), vec!["Spring promo"]);
        let table = s.format_table();
        assert!(table.contains("(not written)"));
        assert!(table.contains("1.5s"));
    }

    #[test]
    fn erase_table_shows_resume_row() {
        let s = EraseSummary {
            variable: "phone".into(),
            loaded: 10,
            start_row: 4,
            run: RunSummary {
                ok: 7,
                ..Default::default()
            },
            elapsed: Duration::ZERO,
        };
        let table = s.format_table();
        assert!(table.contains("Erase 'phone'"));
        assert!(table.contains("Resumed at row"));
    }
}
