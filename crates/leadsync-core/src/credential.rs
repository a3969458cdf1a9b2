//! API credential sources

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No source produced a non-blank value
    Missing { tried: Vec<String> },
    /// A source failed outright (e.g. prompt without a terminal)
    Unavailable { source: String, message: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { tried } => {
                write!(f, "no API key provided (tried: {})", tried.join(", "))
            }
            Self::Unavailable { source, message } => write!(f, "{source}: {message}"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Supplies the API token once, before any work begins.
///
/// `Ok(None)` means the source has nothing to offer; callers may fall back
/// to another source.
pub trait CredentialProvider {
    fn describe(&self) -> String;
    fn token(&self) -> Result<Option<String>, CredentialError>;
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Fixed value (config file, CLI flag, tests)
#[derive(Clone)]
pub struct StaticCredential {
    label: String,
    value: Option<String>,
}

impl StaticCredential {
    pub fn new(label: impl Into<String>, value: Option<String>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("label", &self.label)
            .field("set", &self.value.is_some())
            .finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.value.as_deref().and_then(non_blank))
    }
}

/// Environment variable
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredential {
    fn describe(&self) -> String {
        format!("${}", self.var)
    }

    fn token(&self) -> Result<Option<String>, CredentialError> {
        Ok(std::env::var(&self.var).ok().as_deref().and_then(non_blank))
    }
}

/// Tries each source in order and returns the first token found
#[derive(Default)]
pub struct FirstAvailable {
    sources: Vec<Box<dyn CredentialProvider>>,
}

impl FirstAvailable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl CredentialProvider + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Resolve, turning "nothing found" into [`CredentialError::Missing`]
    pub fn require(&self) -> Result<String, CredentialError> {
        self.token()?.ok_or_else(|| CredentialError::Missing {
            tried: self.sources.iter().map(|s| s.describe()).collect(),
        })
    }
}

impl CredentialProvider for FirstAvailable {
    fn describe(&self) -> String {
        let names: Vec<String> = self.sources.iter().map(|s| s.describe()).collect();
        names.join(" → ")
    }

    fn token(&self) -> Result<Option<String>, CredentialError> {
        for source in &self.sources {
            if let Some(token) = source.token()? {
                log::debug!("API key from {}", source.describe());
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}
