//! # Language-Model Providers
//!
//! A small trait seam over the LM vendor APIs. Providers implement plain
//! completion and tool-augmented (web-search) completion; [`LmClient`]
//! layers retries, pacing, and the search→plain degradation on top so
//! analyzers never talk to a provider directly.

pub mod gemini;
pub mod local;

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dyn_clone::DynClone;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::errors::{ConfigError, LmError};
use crate::retry::{retry_with_backoff, RetryPolicy};

pub use gemini::GeminiProvider;
pub use local::LocalAiProvider;

/// One completion request. The model name is opaque and routed per
/// analyzer by configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub model: &'a str,
}

/// A web source the model consulted during tool-augmented completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

/// A provider response plus the metadata attribution needs.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub token_count: u32,
    pub latency_ms: u64,
    pub citations: Vec<Citation>,
    pub web_search_used: bool,
    /// True when a search request was degraded to plain completion.
    pub search_degraded: bool,
}

/// A trait for interacting with an LM provider.
#[async_trait]
pub trait LmProvider: Send + Sync + Debug + DynClone {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LmError>;

    /// Tool-augmented completion. Providers without a search tool return
    /// [`LmError::SearchToolUnavailable`]; [`LmClient`] handles the
    /// fallback.
    async fn complete_with_search(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, LmError>;
}

dyn_clone::clone_trait_object!(LmProvider);

/// The client every analyzer talks to: a provider plus retry policy, a
/// per-run pacing delay between successful requests, and the degradation
/// path for unavailable search tools.
#[derive(Debug)]
pub struct LmClient {
    provider: Box<dyn LmProvider>,
    retry: RetryPolicy,
    pace: Duration,
    last_success: tokio::sync::Mutex<Option<Instant>>,
}

impl LmClient {
    pub fn new(provider: Box<dyn LmProvider>, retry: RetryPolicy, pace: Duration) -> Self {
        Self {
            provider,
            retry,
            pace,
            last_success: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LmError> {
        self.throttle().await;
        let completion =
            retry_with_backoff(self.retry, || self.provider.complete(request)).await?;
        self.mark_success().await;
        Ok(completion)
    }

    /// Tool-augmented completion, degrading to plain completion when the
    /// search tool is unavailable. The degradation is recorded on the
    /// returned metadata, never surfaced as an error.
    pub async fn complete_with_search(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, LmError> {
        self.throttle().await;
        match retry_with_backoff(self.retry, || self.provider.complete_with_search(request)).await
        {
            Ok(completion) => {
                self.mark_success().await;
                Ok(completion)
            }
            Err(LmError::SearchToolUnavailable) => {
                warn!(model = request.model, "search tool unavailable, degrading to plain completion");
                let mut completion =
                    retry_with_backoff(self.retry, || self.provider.complete(request)).await?;
                completion.web_search_used = false;
                completion.search_degraded = true;
                self.mark_success().await;
                Ok(completion)
            }
            Err(other) => Err(other),
        }
    }

    /// Enforces the per-run delay between successful provider requests.
    async fn throttle(&self) {
        if self.pace.is_zero() {
            return;
        }
        let last = *self.last_success.lock().await;
        if let Some(at) = last {
            let elapsed = at.elapsed();
            if elapsed < self.pace {
                tokio::time::sleep(self.pace - elapsed).await;
            }
        }
    }

    async fn mark_success(&self) {
        *self.last_success.lock().await = Some(Instant::now());
    }
}

/// Builds the provider configured for this run: an OpenAI-compatible local
/// endpoint when `LOCAL_AI_API_URL` is set, the Gemini API otherwise.
pub fn create_provider(config: &PipelineConfig) -> Result<Box<dyn LmProvider>, ConfigError> {
    let provider: Box<dyn LmProvider> = match &config.local_ai_api_url {
        Some(url) => {
            info!(api_url = %url, "using OpenAI-compatible local provider");
            Box::new(
                LocalAiProvider::new(
                    url.clone(),
                    Some(config.ai_api_key.clone()),
                    config.provider_timeout,
                )
                .map_err(|e| ConfigError::InvalidVar {
                    name: "LOCAL_AI_API_URL".to_string(),
                    reason: e.to_string(),
                })?,
            )
        }
        None => Box::new(
            GeminiProvider::new(config.ai_api_key.clone(), config.provider_timeout).map_err(
                |e| ConfigError::InvalidVar {
                    name: "AI_API_KEY".to_string(),
                    reason: e.to_string(),
                },
            )?,
        ),
    };
    Ok(provider)
}
