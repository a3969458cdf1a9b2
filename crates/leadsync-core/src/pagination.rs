//! Sequential walk of a paged listing endpoint

use serde_json::Value;

use crate::executor::RetryingExecutor;
use crate::http::{ApiRequest, Transport};

/// Shape of one listing page
#[derive(Debug, PartialEq)]
pub enum PageResponse {
    /// `{ "<items_key>": [...], "pagination": { "totalPage": N } }`
    Envelope {
        items: Vec<Value>,
        total_pages: Option<u32>,
    },
    /// `[...]`; page count unknown
    BareArray { items: Vec<Value> },
    Unrecognized,
}

impl PageResponse {
    pub fn classify(value: Value, items_key: &str) -> Self {
        match value {
            Value::Array(items) => Self::BareArray { items },
            Value::Object(mut map) => {
                let total_pages = map
                    .get("pagination")
                    .and_then(|p| p.get("totalPage"))
                    .and_then(Value::as_u64)
                    .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
                match map.remove(items_key) {
                    Some(Value::Array(items)) => Self::Envelope { items, total_pages },
                    _ => Self::Unrecognized,
                }
            }
            _ => Self::Unrecognized,
        }
    }
}

/// Walks pages 1..N through a [`RetryingExecutor`], on the calling thread.
///
/// Stops at the last page, an empty page, an unrecognized shape, or a failed
/// request; whatever was gathered up to that point is returned.
pub struct PaginationAggregator<'a, T> {
    executor: &'a RetryingExecutor<T>,
    items_key: String,
}

impl<'a, T: Transport> PaginationAggregator<'a, T> {
    pub fn new(executor: &'a RetryingExecutor<T>, items_key: impl Into<String>) -> Self {
        Self {
            executor,
            items_key: items_key.into(),
        }
    }

    /// `request_for_page` builds the request for 1-based page `n`
    pub fn fetch_all(&self, request_for_page: impl Fn(u32) -> ApiRequest) -> Vec<Value> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let request = request_for_page(page);
            let resp = match self.executor.execute(&request) {
                Ok(resp) => resp,
                Err(e) => {
                    log::warn!(
                        "page {page}: {e}; keeping {} items from earlier pages",
                        all.len()
                    );
                    break;
                }
            };
            let value: Value = match resp.json() {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("page {page}: invalid JSON ({e}), stopping");
                    break;
                }
            };

            let (batch, total_pages) = match PageResponse::classify(value, &self.items_key) {
                PageResponse::Envelope { items, total_pages } => {
                    (items, total_pages.unwrap_or(page))
                }
                PageResponse::BareArray { items } => (items, page),
                PageResponse::Unrecognized => {
                    log::warn!("page {page}: unrecognized response shape, stopping");
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }
            log::info!("page {page}/{total_pages}: {} {}", batch.len(), self.items_key);
            all.extend(batch);
            if page >= total_pages {
                break;
            }
            page += 1;
            self.executor
                .sleeper()
                .sleep(self.executor.limiter().request_delay());
        }

        log::info!("{} {} fetched", all.len(), self.items_key);
        all
    }
}
