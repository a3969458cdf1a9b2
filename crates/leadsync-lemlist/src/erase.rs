//! Bulk erase of one lead variable.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use leadsync_core::reference::read_column_path;
use leadsync_core::{ID_COLUMN, Transport, WorkQueue, WorkerPool};

use crate::api::LemlistApi;
use crate::stats::EraseSummary;

/// `_id` column of `path`, in file order.
///
/// Order is kept so that `--start-row` refers to the same rows across runs.
pub fn load_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    read_column_path(path, ID_COLUMN)
        .with_context(|| format!("Cannot read lead IDs from {}", path.display()))
}

/// Clear `variable` on every lead from 1-based row `start_row` onwards
pub fn run_erase<T: Transport>(
    api: &LemlistApi<T>,
    pool: &WorkerPool,
    ids: Vec<String>,
    start_row: usize,
    variable: &str,
) -> anyhow::Result<EraseSummary> {
    let start = Instant::now();
    let loaded = ids.len();
    let queue = WorkQueue::starting_at(ids, start_row);
    if queue.total() == 0 {
        log::warn!("Nothing to erase (start row {start_row}, {loaded} IDs loaded)");
    }

    let run = pool.run_queue(queue, |id| api.erase_variable(id, variable))?;

    Ok(EraseSummary {
        variable: variable.to_string(),
        loaded,
        start_row,
        run,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadsync_core::{ApiRequest, ApiResponse, RateLimiter, RetryingExecutor, TransportError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Transport for Recorder {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            let label = request.label();
            self.seen.lock().unwrap().push(label.clone());
            Ok(if label.contains("/l3/") {
                ApiResponse::new(500, "boom")
            } else {
                ApiResponse::new(200, "{}")
            })
        }
    }

    fn api() -> LemlistApi<Arc<Recorder>> {
        LemlistApi::new(RetryingExecutor::new(
            Arc::new(Recorder::default()),
            Arc::new(RateLimiter::unlimited()),
        ))
    }

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("l{i}")).collect()
    }

    #[test]
    fn load_ids_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matched_lead_ids.csv");
        std::fs::write(&path, "_id\nl2\nl1\n\nl2\n").unwrap();
        assert_eq!(load_ids(&path).unwrap(), vec!["l2", "l1", "l2"]);
    }

    #[test]
    fn erases_every_id() {
        let api = api();
        let summary = run_erase(&api, &WorkerPool::new(3), ids(5), 1, "phone").unwrap();
        assert_eq!(summary.run.ok, 4);
        assert_eq!(summary.run.failed, 1);
        assert_eq!(summary.run.failures[0].key, "l3");
        assert_eq!(summary.run.failures[0].status, Some(500));
        assert_eq!(api.executor().transport().seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn resumes_from_start_row() {
        let api = api();
        let summary = run_erase(&api, &WorkerPool::new(2), ids(5), 4, "phone").unwrap();
        assert_eq!(summary.loaded, 5);
        assert_eq!(summary.run.total(), 2);
        let mut seen = api.executor().transport().seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["DELETE leads/l4/variables", "DELETE leads/l5/variables"]
        );
    }

    #[test]
    fn start_row_past_end_is_empty() {
        let api = api();
        let summary = run_erase(&api, &WorkerPool::new(2), ids(2), 10, "phone").unwrap();
        assert_eq!(summary.run.total(), 0);
    }
}
