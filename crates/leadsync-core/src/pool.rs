//! Bounded worker pool draining a fixed list of work items

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;

use indicatif::ProgressBar;

use crate::outcome::{FailureKind, Outcome, OutcomeAggregator, RunSummary};
use crate::progress::fmt_num;
use crate::shutdown::ShutdownFlag;
use crate::work_queue::WorkQueue;

/// Default pool width (stays well inside 20 req / 2 s with per-request spacing)
pub const DEFAULT_WORKERS: usize = 5;

/// Non-TTY progress log interval (completed items)
const LOG_INTERVAL: usize = 500;

/// Something a worker can process; `key` identifies it in outcomes and logs.
pub trait WorkItem: Sync {
    fn key(&self) -> String;
}

impl WorkItem for String {
    fn key(&self) -> String {
        self.clone()
    }
}

/// Runs one operation per item on up to `workers` threads.
///
/// Every item yields exactly one [`Outcome`]: panics become `panicked`
/// failures and items not started before shutdown become `cancelled` skips.
pub struct WorkerPool {
    workers: usize,
    label: String,
    shutdown: ShutdownFlag,
    progress: ProgressBar,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            label: "items".to_string(),
            shutdown: ShutdownFlag::new(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Name used in progress logs
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run<I, P, F>(&self, items: Vec<I>, op: F) -> io::Result<RunSummary<P>>
    where
        I: WorkItem,
        P: Send,
        F: Fn(&I) -> Outcome<P> + Sync,
    {
        self.run_queue(WorkQueue::new(items), op)
    }

    /// Drain `queue` to completion. Only fails if the thread pool cannot start.
    pub fn run_queue<I, P, F>(&self, queue: WorkQueue<I>, op: F) -> io::Result<RunSummary<P>>
    where
        I: WorkItem,
        P: Send,
        F: Fn(&I) -> Outcome<P> + Sync,
    {
        let total = queue.total();
        let aggregator = OutcomeAggregator::new();
        let width = self.workers.min(total.max(1));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("worker-{i}"))
            .build()
            .map_err(io::Error::other)?;

        log::info!(
            "{}: processing {} items (concurrency={width})",
            self.label,
            fmt_num(total)
        );
        self.progress.set_length(total as u64);

        pool.scope(|s| {
            for _ in 0..width {
                s.spawn(|_| {
                    while let Some(item) = queue.next() {
                        let outcome = if self.shutdown.is_requested() {
                            Outcome::failure(
                                item.key(),
                                None,
                                FailureKind::Cancelled,
                                "shutdown requested",
                            )
                        } else {
                            run_guarded(item, &op)
                        };
                        aggregator.record(outcome);
                        self.report(&aggregator, total);
                    }
                });
            }
        });

        self.progress.finish_and_clear();
        let summary = aggregator.into_summary();
        log::info!(
            "{}: done (ok={}, failed={}, skipped={})",
            self.label,
            fmt_num(summary.ok),
            fmt_num(summary.failed),
            fmt_num(summary.skipped)
        );
        Ok(summary)
    }

    fn report<P>(&self, aggregator: &OutcomeAggregator<P>, total: usize) {
        let ok = aggregator.ok_count();
        let failed = aggregator.failed_count();
        self.progress.inc(1);
        self.progress
            .set_message(format!("ok={} fail={}", fmt_num(ok), fmt_num(failed)));

        if self.progress.is_hidden() {
            let done = aggregator.completed();
            if done.is_multiple_of(LOG_INTERVAL) || done == total {
                log::info!(
                    "{}: {}/{} (ok={}, fail={})",
                    self.label,
                    fmt_num(done),
                    fmt_num(total),
                    fmt_num(ok),
                    fmt_num(failed)
                );
            }
        }
    }
}

/// Run `op` for one item, converting a panic into a failed outcome
fn run_guarded<I, P, F>(item: &I, op: &F) -> Outcome<P>
where
    I: WorkItem,
    F: Fn(&I) -> Outcome<P>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| op(item))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let key = item.key();
            log::error!("{key}: worker panicked: {message}");
            Outcome::failure(key, None, FailureKind::Panicked, message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item-{i:04}")).collect()
    }

    #[test]
    fn every_item_yields_one_outcome() {
        let items = keys(500);
        let summary = WorkerPool::new(5)
            .run(items, |key: &String| {
                let n: usize = key[5..].parse().unwrap();
                match n % 7 {
                    0 => Outcome::failure(key.clone(), Some(500), FailureKind::Rejected, "no"),
                    3 => panic!("injected failure for {key}"),
                    _ => Outcome::success(key.clone(), Some(200), n),
                }
            })
            .unwrap();

        assert_eq!(summary.total(), 500);
        assert_eq!(summary.ok + summary.failed, 500);
        assert_eq!(summary.skipped, 0);
        let panicked = summary
            .failures
            .iter()
            .filter(|f| f.kind == FailureKind::Panicked)
            .count();
        assert_eq!(panicked, 71); // n % 7 == 3 for n < 500
        assert!(!summary.failures[0].message.is_empty());
    }

    #[test]
    fn concurrency_is_bounded() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let summary = WorkerPool::new(3)
            .run(keys(30), |key: &String| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Outcome::success(key.clone(), None, ())
            })
            .unwrap();
        assert_eq!(summary.ok, 30);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn shutdown_skips_remaining_items() {
        let shutdown = ShutdownFlag::new();
        let trigger = shutdown.clone();
        let summary = WorkerPool::new(1)
            .with_shutdown(shutdown)
            .run(keys(10), |key: &String| {
                if key == "item-0003" {
                    trigger.request();
                }
                Outcome::success(key.clone(), Some(200), ())
            })
            .unwrap();
        assert_eq!(summary.ok, 4);
        assert_eq!(summary.skipped, 6);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total(), 10);
    }

    #[test]
    fn empty_input() {
        let summary = WorkerPool::new(5)
            .run(Vec::<String>::new(), |key: &String| {
                Outcome::success(key.clone(), None, ())
            })
            .unwrap();
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
