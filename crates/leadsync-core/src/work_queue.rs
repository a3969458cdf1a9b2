//! Lock-free work queue for distributing items across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free queue of pre-enumerated work items.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item;
/// every item is handed out exactly once.
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Create queue resuming at 1-based row `start_row` (manual resume after an
    /// interrupted run). `start_row <= 1` keeps everything.
    pub fn starting_at(mut items: Vec<T>, start_row: usize) -> Self {
        let skip = start_row.saturating_sub(1).min(items.len());
        if skip > 0 {
            items.drain(..skip);
            log::info!(
                "Resuming from row {start_row}: {} items remaining",
                items.len()
            );
        }
        Self::new(items)
    }

    /// Claim the next item (lock-free)
    pub fn next(&self) -> Option<&T> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}
