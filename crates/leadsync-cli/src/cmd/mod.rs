//! Subcommands and the plumbing they share

pub mod erase;
pub mod export;
pub mod extract;
pub mod lookup;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use leadsync_core::{
    CredentialError, CredentialProvider, EnvCredential, FailedItem, FirstAvailable,
    HttpTransport, RateLimiter, RateWindow, RetryPolicy, RetryingExecutor, SharedProgress,
    ShutdownFlag, StaticCredential, WorkerPool, write_failure_log,
};
use leadsync_lemlist::LemlistApi;

/// Environment variable consulted when the config has no API key
pub const API_KEY_ENV: &str = "LEMLIST_API_KEY";

/// Exit code of a run stopped by SIGINT/SIGTERM
const INTERRUPTED: u8 = 130;

/// Config file values with CLI overrides applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub rate: RateWindow,
    pub max_retries: u32,
    pub workers: usize,
    pub output_dir: PathBuf,
}

/// Rate window length from a seconds value given on the CLI or in the config
pub fn rate_window_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .with_context(|| format!("Rate window must be a positive number of seconds, got {secs}"))
}

/// Hidden interactive prompt; offers nothing when stdin is not a terminal
struct PromptCredential;

impl CredentialProvider for PromptCredential {
    fn describe(&self) -> String {
        "prompt".to_string()
    }

    fn token(&self) -> Result<Option<String>, CredentialError> {
        if !std::io::stdin().is_terminal() {
            return Ok(None);
        }
        let raw = rpassword::prompt_password("Lemlist API key: ").map_err(|e| {
            CredentialError::Unavailable {
                source: self.describe(),
                message: e.to_string(),
            }
        })?;
        let key = raw.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }
}

/// State shared by one command run
pub struct Session {
    pub settings: Settings,
    pub progress: SharedProgress,
    pub shutdown: ShutdownFlag,
}

impl Session {
    pub fn new(settings: Settings, progress: SharedProgress) -> Self {
        Self {
            settings,
            progress,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Resolve the API key and build the rate-limited client.
    ///
    /// Also installs the signal handlers, so a Ctrl-C from here on drains the
    /// pool instead of killing the process.
    pub fn connect(&self) -> Result<LemlistApi<HttpTransport>> {
        let credentials = FirstAvailable::new()
            .with(StaticCredential::new(
                "config api_key",
                self.settings.api_key.clone(),
            ))
            .with(EnvCredential::new(API_KEY_ENV))
            .with(PromptCredential);
        let api_key = credentials
            .require()
            .context("Lemlist API key is required")?;

        let transport = HttpTransport::new(&self.settings.base_url, api_key, self.settings.timeout)
            .with_context(|| format!("Invalid API base URL: {}", self.settings.base_url))?;
        let limiter = Arc::new(RateLimiter::new(self.settings.rate));
        let executor = RetryingExecutor::new(transport, limiter)
            .with_policy(RetryPolicy::default().with_max_attempts(self.settings.max_retries));

        self.shutdown
            .register_signals()
            .context("Failed to install signal handlers")?;

        log::info!(
            "API {} ({} req / {:.1}s, {} attempts, {} workers)",
            self.settings.base_url,
            self.settings.rate.capacity,
            self.settings.rate.window.as_secs_f64(),
            self.settings.max_retries,
            self.settings.workers
        );
        Ok(LemlistApi::new(executor))
    }

    pub fn pool(&self, label: &str) -> WorkerPool {
        WorkerPool::new(self.settings.workers)
            .with_label(label)
            .with_shutdown(self.shutdown.clone())
            .with_progress(self.progress.item_bar(label, 0))
    }

    /// `<dir>/<name>`, falling back to the output directory
    pub fn output_path(&self, dir: Option<&Path>, name: &str) -> PathBuf {
        dir.unwrap_or(&self.settings.output_dir).join(name)
    }

    /// Write `<name>_log.txt` into the output directory when anything failed
    pub fn write_failures(&self, name: &str, failures: &[FailedItem]) -> Result<Option<PathBuf>> {
        let path = self.settings.output_dir.join(format!("{name}_log.txt"));
        let written = write_failure_log(&path, failures)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(written.then_some(path))
    }

    /// 130 when interrupted, an error when items failed, success otherwise
    pub fn exit_code(&self, failed: usize, log: Option<&Path>) -> Result<ExitCode> {
        if self.shutdown.is_requested() {
            log::warn!("Interrupted; remaining items were skipped");
            return Ok(ExitCode::from(INTERRUPTED));
        }
        if failed > 0 {
            match log {
                Some(path) => anyhow::bail!("{failed} item(s) failed, see {}", path.display()),
                None => anyhow::bail!("{failed} item(s) failed"),
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadsync_core::{FailureKind, ProgressContext};

    fn session(dir: &Path) -> Session {
        Session::new(
            Settings {
                base_url: leadsync_lemlist::BASE_URL.to_string(),
                api_key: None,
                timeout: Duration::from_secs(60),
                rate: leadsync_lemlist::default_rate_window(),
                max_retries: 5,
                workers: 5,
                output_dir: dir.to_path_buf(),
            },
            Arc::new(ProgressContext::hidden()),
        )
    }

    #[test]
    fn rate_window_must_be_positive_and_finite() {
        assert_eq!(rate_window_duration(2.0).unwrap(), Duration::from_secs(2));
        assert_eq!(rate_window_duration(0.5).unwrap(), Duration::from_millis(500));
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e30] {
            let err = rate_window_duration(bad).unwrap_err();
            assert!(err.to_string().contains("Rate window must be"), "{bad}");
        }
    }

    #[test]
    fn failure_log_named_after_command() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        assert_eq!(s.write_failures("erase", &[]).unwrap(), None);

        let failures = vec![FailedItem {
            key: "lea_1".into(),
            status: Some(500),
            kind: FailureKind::Rejected,
            message: "HTTP 500".into(),
        }];
        let path = s.write_failures("erase", &failures).unwrap().unwrap();
        assert_eq!(path, dir.path().join("erase_log.txt"));
    }

    #[test]
    fn exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        assert_eq!(s.exit_code(0, None).unwrap(), ExitCode::SUCCESS);
        assert!(s.exit_code(2, None).is_err());
        s.shutdown.request();
        assert_eq!(s.exit_code(2, None).unwrap(), ExitCode::from(130));
    }

    #[test]
    fn output_path_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        assert_eq!(s.output_path(None, "a.csv"), dir.path().join("a.csv"));
        assert_eq!(
            s.output_path(Some(Path::new("/x")), "a.csv"),
            PathBuf::from("/x/a.csv")
        );
    }
}
