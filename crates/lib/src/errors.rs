use std::time::Duration;
use thiserror::Error;

use crate::retry::Retryable;

/// Errors produced by a language-model provider call.
///
/// The variants mirror the failure classes the pipeline cares about: the
/// first four are surfaced to callers, `RateLimited` and `Timeout` are
/// retried, and `SearchToolUnavailable` triggers the plain-completion
/// fallback inside [`crate::providers::ai::LmClient`].
#[derive(Error, Debug, Clone)]
pub enum LmError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider rejected the request: {0}")]
    InvalidRequest(String),
    #[error("authentication with the provider failed: {0}")]
    AuthFailed(String),
    #[error("provider rate limit hit")]
    RateLimited { retry_after: Option<Duration> },
    #[error("the web search tool is unavailable on this endpoint")]
    SearchToolUnavailable,
}

impl LmError {
    /// Maps a transport-level error onto the taxonomy. Timeouts and
    /// connection failures are transient; everything else means the provider
    /// never saw a well-formed call.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LmError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            LmError::ProviderUnavailable(err.to_string())
        } else {
            LmError::InvalidRequest(err.to_string())
        }
    }

    /// Maps an HTTP status from the provider onto the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LmError::AuthFailed(body),
            402 => LmError::AuthFailed(format!("billing failure: {body}")),
            429 => LmError::RateLimited { retry_after: None },
            500..=599 => LmError::ProviderUnavailable(body),
            _ => LmError::InvalidRequest(body),
        }
    }

    /// Short machine-readable kind, used in attribution records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LmError::ProviderUnavailable(_) => "provider_unavailable",
            LmError::Timeout(_) => "timeout",
            LmError::InvalidRequest(_) => "invalid_request",
            LmError::AuthFailed(_) => "auth_failed",
            LmError::RateLimited { .. } => "rate_limited",
            LmError::SearchToolUnavailable => "search_tool_unavailable",
        }
    }
}

impl Retryable for LmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LmError::ProviderUnavailable(_) | LmError::Timeout(_) | LmError::RateLimited { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from the destination note store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store rate limit hit")]
    RateLimited { retry_after: Option<Duration> },
    #[error("a page with this fingerprint already exists: {0}")]
    Conflict(String),
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("store response could not be parsed: {0}")]
    Deserialization(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("destination database schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(Duration::ZERO)
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::RateLimited { .. } => "rate_limited",
            StoreError::Conflict(_) => "conflict",
            StoreError::Transport(_) => "transport",
            StoreError::Api { .. } => "api",
            StoreError::Deserialization(_) => "deserialization",
            StoreError::Timeout(_) => "timeout",
            StoreError::SchemaMismatch(_) => "schema_mismatch",
        }
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::RateLimited { .. } | StoreError::Transport(_) | StoreError::Timeout(_) => {
                true
            }
            StoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while loading or validating prompt templates.
///
/// Lookups never fail; these only occur at load or refresh time.
#[derive(Error, Debug)]
pub enum PromptStoreError {
    #[error("template '{name}' references unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder { name: String, placeholder: String },
    #[error("failed to read local prompt file: {0}")]
    LocalFile(#[from] std::io::Error),
    #[error("failed to parse local prompt file: {0}")]
    LocalFormat(#[from] serde_yaml::Error),
    #[error("remote prompt source failed: {0}")]
    Remote(#[from] StoreError),
}

/// Errors from a single text extractor. The chain swallows these and moves
/// on to the next extractor; only logging sees them.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to parse document: {0}")]
    Parse(String),
}

/// Errors from a document source.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("the specified source could not be found: {0}")]
    SourceNotFound(String),
    #[error("failed to read content from the source: {0}")]
    Io(#[from] std::io::Error),
    #[error("source URL is not valid: {0}")]
    InvalidUrl(String),
}

/// Configuration problems. These are the only errors allowed to escape to
/// the process boundary (exit code 1).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("environment variable {name} is invalid: {reason}")]
    InvalidVar { name: String, reason: String },
}

/// Fatal per-document failures inside the pipeline. Analyzer failures never
/// surface here; they are carried as payloads inside `AnalyzerResult`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("write to the destination store failed: {0}")]
    Write(StoreError),
    #[error("dedup lookup failed: {0}")]
    Dedup(StoreError),
    #[error("document processing exceeded {0:?}")]
    DocumentTimeout(Duration),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Write(_) => "write_failed",
            PipelineError::Dedup(_) => "dedup_failed",
            PipelineError::DocumentTimeout(_) => "document_timeout",
        }
    }
}
