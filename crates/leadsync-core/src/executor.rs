//! Rate-limited request execution with bounded retries

use std::sync::Arc;

use crate::error::RequestError;
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::outcome::{FailureKind, Outcome};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryCause, RetryPolicy, Sleeper, ThreadSleeper};

/// Maximum response body kept in a `Rejected` error
const REJECTED_BODY_LIMIT: usize = 200;

/// Issues one logical request: a limiter permit before every attempt, 429 and
/// transient failures retried per [`RetryPolicy`], other statuses terminal.
///
/// Holds no per-request state, so one executor is shared by every worker.
pub struct RetryingExecutor<T> {
    transport: T,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<T> std::fmt::Debug for RetryingExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingExecutor")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> RetryingExecutor<T> {
    pub fn new(transport: T, limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            limiter,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Run `request` to a terminal result.
    pub fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, RequestError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire();

            match self.transport.send(request) {
                Ok(resp) if resp.is_rate_limited() => {
                    if !self.policy.can_retry_after(attempt) {
                        log::debug!("{}: rate-limited, giving up after {attempt}", request.label());
                        return Err(RequestError::RateLimited { attempts: attempt });
                    }
                    let wait = self.policy.backoff(RetryCause::RateLimited {
                        advised: resp.retry_after,
                    });
                    log::debug!(
                        "{}: rate-limited, retry {attempt}/{max} in {wait:?}",
                        request.label()
                    );
                    self.sleeper.sleep(wait);
                }
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) => {
                    return Err(RequestError::Rejected {
                        status: resp.status,
                        body: truncate_chars(&resp.body, REJECTED_BODY_LIMIT),
                    });
                }
                Err(e) if e.is_retryable() && self.policy.can_retry_after(attempt) => {
                    let wait = self.policy.backoff(RetryCause::Transient);
                    log::debug!(
                        "{}: {e}, retry {attempt}/{max} in {wait:?}",
                        request.label()
                    );
                    self.sleeper.sleep(wait);
                }
                Err(e) => {
                    return Err(RequestError::Transient {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Run `request` for work item `key` and turn the response into an [`Outcome`].
    ///
    /// `decode` interprets a 2xx response; its error marks the item as failed
    /// with [`FailureKind::Decode`].
    pub fn execute_item<P>(
        &self,
        key: &str,
        request: &ApiRequest,
        decode: impl FnOnce(&ApiResponse) -> Result<P, String>,
    ) -> Outcome<P> {
        match self.execute(request) {
            Ok(resp) => match decode(&resp) {
                Ok(payload) => Outcome::success(key, Some(resp.status), payload),
                Err(msg) => Outcome::failure(key, Some(resp.status), FailureKind::Decode, msg),
            },
            Err(e) => Outcome::from_request_error(key, &e),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
