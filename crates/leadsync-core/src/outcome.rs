//! Per-item outcomes and their thread-safe aggregation.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::RequestError;

/// Why an item ended without a usable result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Retry budget exhausted on 429 responses
    RateLimited,
    /// Network/timeout failures exhausted the retry budget
    Transient,
    /// Remote answered with a terminal non-2xx status
    Rejected,
    /// 2xx response whose body could not be interpreted
    Decode,
    /// The operation panicked
    Panicked,
    /// Never started because shutdown was requested
    Cancelled,
    /// Result could not be written to local output
    Storage,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate-limited",
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Decode => "decode",
            Self::Panicked => "panicked",
            Self::Cancelled => "cancelled",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&RequestError> for Failure {
    fn from(e: &RequestError) -> Self {
        let kind = match e {
            RequestError::RateLimited { .. } => FailureKind::RateLimited,
            RequestError::Transient { .. } => FailureKind::Transient,
            RequestError::Rejected { .. } => FailureKind::Rejected,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

/// Terminal result of processing one work item
#[derive(Clone, Debug)]
pub struct Outcome<P> {
    pub key: String,
    pub status: Option<u16>,
    pub result: Result<P, Failure>,
}

impl<P> Outcome<P> {
    pub fn success(key: impl Into<String>, status: Option<u16>, payload: P) -> Self {
        Self {
            key: key.into(),
            status,
            result: Ok(payload),
        }
    }

    pub fn failure(
        key: impl Into<String>,
        status: Option<u16>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            status,
            result: Err(Failure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn from_request_error(key: impl Into<String>, e: &RequestError) -> Self {
        Self {
            key: key.into(),
            status: e.status(),
            result: Err(Failure::from(e)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A recorded failure, detached from any payload type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
    pub key: String,
    pub status: Option<u16>,
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for FailedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status.map_or("-".to_string(), |s| s.to_string());
        // One line per failure; collapse any newlines from response bodies
        let message = self.message.replace(['\r', '\n'], " ");
        write!(f, "{}\t{}\t{}\t{}", self.key, self.kind, status, message)
    }
}

/// Counts and details of a finished run
#[derive(Debug)]
pub struct RunSummary<P> {
    pub ok: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<FailedItem>,
    /// `(key, payload)` of every successful item, in completion order
    pub payloads: Vec<(String, P)>,
}

impl<P> Default for RunSummary<P> {
    fn default() -> Self {
        Self {
            ok: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            payloads: Vec::new(),
        }
    }
}

impl<P> RunSummary<P> {
    pub fn total(&self) -> usize {
        self.ok + self.failed + self.skipped
    }
}

/// Thread-safe accumulation of outcomes.
///
/// Counters are atomics; the vectors are behind mutexes held only for the push.
#[derive(Debug)]
pub struct OutcomeAggregator<P> {
    ok: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    failures: Mutex<Vec<FailedItem>>,
    payloads: Mutex<Vec<(String, P)>>,
}

impl<P> Default for OutcomeAggregator<P> {
    fn default() -> Self {
        Self {
            ok: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
        }
    }
}

impl<P> OutcomeAggregator<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome<P>) {
        match outcome.result {
            Ok(payload) => {
                self.payloads
                    .lock()
                    .expect("outcome lock poisoned")
                    .push((outcome.key, payload));
                self.ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(failure) => {
                if failure.kind == FailureKind::Cancelled {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                self.failures
                    .lock()
                    .expect("outcome lock poisoned")
                    .push(FailedItem {
                        key: outcome.key,
                        status: outcome.status,
                        kind: failure.kind,
                        message: failure.message,
                    });
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn ok_count(&self) -> usize {
        self.ok.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.ok_count() + self.failed_count() + self.skipped_count()
    }

    /// Finish aggregation once every worker is done
    pub fn into_summary(self) -> RunSummary<P> {
        RunSummary {
            ok: self.ok.into_inner(),
            failed: self.failed.into_inner(),
            skipped: self.skipped.into_inner(),
            failures: self.failures.into_inner().expect("outcome lock poisoned"),
            payloads: self.payloads.into_inner().expect("outcome lock poisoned"),
        }
    }
}

/// Write one line per failure. Nothing is written (and `false` returned) when
/// there are no failures.
pub fn write_failure_log(path: &Path, failures: &[FailedItem]) -> io::Result<bool> {
    if failures.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for failure in failures {
        writeln!(writer, "{failure}")?;
    }
    writer.flush()?;
    log::info!("Wrote {} failures to {}", failures.len(), path.display());
    Ok(true)
}
