//! Leadsync Lemlist - export, reconcile, and clean up Lemlist leads
//!
//! Pipelines built on `leadsync-core`:
//! - export: every campaign's leads into one `all_leads_<timestamp>.json`
//! - extract: unique and matched lead IDs from an export, offline
//! - lookup: lead IDs by email through the API
//! - erase: clear one variable on a list of leads

pub mod api;
pub mod erase;
pub mod export;
pub mod extract;
pub mod lookup;
pub mod stats;

// Re-exports
pub use api::{
    BASE_URL, Campaign, DEFAULT_ERASE_VARIABLE, EXPORT_TIMEOUT, LemlistApi, LookupResult,
    default_rate_window,
};
pub use erase::{load_ids, run_erase};
pub use export::{export_file_name, latest_export, run_export};
pub use extract::{MATCHED_IDS_FILE, UNIQUE_IDS_FILE, extract_unique_ids, match_leads};
pub use lookup::{LOOKUP_IDS_FILE, load_emails, run_lookup};
pub use stats::{DedupSummary, EraseSummary, ExportSummary, LookupSummary, MatchSummary};
