//! Leadsync Core - rate-limited bulk execution and streaming reconciliation
//!
//! This crate provides the service-independent engine: a shared request
//! limiter, retrying executor, bounded worker pool, pagination, and the
//! record-stream reconciler used to dedup and match exported records.

pub mod credential;
pub mod error;
pub mod executor;
pub mod http;
pub mod logging;
pub mod outcome;
pub mod pagination;
pub mod pool;
pub mod progress;
pub mod rate_limit;
pub mod reconcile;
pub mod record_stream;
pub mod reference;
pub mod result_set;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod work_queue;

// Re-exports for convenience
pub use credential::{
    CredentialError, CredentialProvider, EnvCredential, FirstAvailable, StaticCredential,
};
pub use error::{RequestError, TransportError};
pub use executor::RetryingExecutor;
pub use http::{
    ApiRequest, ApiResponse, DEFAULT_REQUEST_TIMEOUT, HttpTransport, Method, SHARED_RUNTIME,
    Transport,
};
pub use logging::{IndicatifLogger, init_logging};
pub use outcome::{
    FailedItem, Failure, FailureKind, Outcome, OutcomeAggregator, RunSummary, write_failure_log,
};
pub use pagination::{PageResponse, PaginationAggregator};
pub use pool::{DEFAULT_WORKERS, WorkItem, WorkerPool};
pub use progress::{ProgressContext, SharedProgress, fmt_mb, fmt_num};
pub use rate_limit::{RateLimiter, RateWindow};
pub use reconcile::{
    Dedup, MatchReference, ReconcileStats, Reconciler, Reconciliation, RecordKeys,
    RecordPredicate,
};
pub use record_stream::{RecordStreamWriter, record_line};
pub use reference::{ReferenceError, ReferenceSet, normalize_email, normalize_linkedin};
pub use result_set::{ID_COLUMN, ResultSet};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use shutdown::ShutdownFlag;
pub use sink::{AtomicFile, cleanup_tmp_files};
pub use work_queue::WorkQueue;
