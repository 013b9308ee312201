//! # Analyzers
//!
//! One analyzer per analysis kind. All of them share the same shape: pull
//! the best template from the prompt store, render it against the document,
//! call the LM client on the endpoint the flags select, and parse the
//! response defensively into a typed payload. Failures become payloads, not
//! errors: every invocation yields an [`AnalyzerResult`] with attribution,
//! successful or not.

pub mod classifier;
pub mod content_tagger;
pub mod insights;
pub mod parse;
pub mod summarizer;
pub mod tagger;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::errors::LmError;
use crate::prompt_store::PromptStore;
use crate::prompts::{render, PromptTemplate, TemplateSource, TemplateVars};
use crate::providers::ai::{Completion, CompletionRequest, LmClient};

pub use classifier::{Classification, ClassifierAnalyzer};
pub use content_tagger::ContentTaggerAnalyzer;
pub use insights::InsightsAnalyzer;
pub use summarizer::SummarizerAnalyzer;
pub use tagger::TaggerAnalyzer;

/// Every analysis kind the pipeline knows about. The first five run in the
/// standard pass; `Technical` and `Market` are deep-dive kinds routed the
/// same way when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    Classifier,
    Summarizer,
    Insights,
    Tagger,
    ContentTagger,
    Technical,
    Market,
}

impl AnalyzerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Classifier => "classifier",
            AnalyzerKind::Summarizer => "summarizer",
            AnalyzerKind::Insights => "insights",
            AnalyzerKind::Tagger => "tagger",
            AnalyzerKind::ContentTagger => "content-tagger",
            AnalyzerKind::Technical => "technical",
            AnalyzerKind::Market => "market",
        }
    }

    pub fn all() -> &'static [AnalyzerKind] {
        &[
            AnalyzerKind::Classifier,
            AnalyzerKind::Summarizer,
            AnalyzerKind::Insights,
            AnalyzerKind::Tagger,
            AnalyzerKind::ContentTagger,
            AnalyzerKind::Technical,
            AnalyzerKind::Market,
        ]
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata tying one generated artifact to the prompt, model, and run that
/// produced it. Populated on every result, including failed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub execution_id: Uuid,
    pub prompt_id: String,
    pub prompt_name: String,
    pub prompt_version: u32,
    pub prompt_source: TemplateSource,
    pub temperature: f32,
    pub model: String,
    pub web_search_used: bool,
    pub duration_ms: u64,
    pub token_count: u32,
    pub timestamp: DateTime<Utc>,
    pub error_kind: Option<String>,
}

/// The typed content one analyzer produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerPayload {
    Classification(Classification),
    /// Markdown summary.
    Summary(String),
    /// Distinct observations, one per entry.
    Insights(Vec<String>),
    Tags {
        topical: Vec<String>,
        domain: Vec<String>,
    },
    ContentTags(Vec<String>),
    Failed {
        error_kind: String,
        message: String,
    },
}

impl AnalyzerPayload {
    pub fn is_failed(&self) -> bool {
        matches!(self, AnalyzerPayload::Failed { .. })
    }
}

/// Output of one analyzer invocation.
#[derive(Debug, Clone)]
pub struct AnalyzerResult {
    pub kind: AnalyzerKind,
    pub payload: AnalyzerPayload,
    pub attribution: Attribution,
    pub quality_subscore: Option<u8>,
}

/// What an analyzer sees for one document.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerInput<'a> {
    pub text: &'a str,
    pub title: &'a str,
    /// Classifier output, fed to every later analyzer for prompt routing.
    pub content_type_hint: Option<&'a str>,
}

/// The common analyzer contract.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Runs the analysis. Infallible by contract: internal errors come back
    /// as a `Failed` payload with attribution.
    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult;
}

/// The machinery shared by every analyzer: template resolution, rendering
/// with a per-analyzer character budget, endpoint choice, invocation, and
/// attribution assembly.
pub(crate) struct AnalyzerEngine {
    pub prompts: Arc<PromptStore>,
    pub lm: Arc<LmClient>,
    pub model: String,
    pub web_search_allowed: bool,
    pub char_budget: usize,
}

impl AnalyzerEngine {
    pub fn from_config(
        prompts: Arc<PromptStore>,
        lm: Arc<LmClient>,
        config: &PipelineConfig,
        kind: AnalyzerKind,
        char_budget: usize,
    ) -> Self {
        Self {
            prompts,
            lm,
            model: config.model_for(kind).to_string(),
            web_search_allowed: config.web_search_for(kind),
            char_budget,
        }
    }

    /// One template-driven LM invocation, measured and attributed.
    pub async fn invoke(
        &self,
        kind: AnalyzerKind,
        input: AnalyzerInput<'_>,
        hints: &str,
    ) -> Invocation {
        let content_type = input.content_type_hint.unwrap_or("default");
        let template = self.prompts.get(content_type, kind);

        let truncated = truncate_chars(input.text, self.char_budget);
        let user = render(
            &template.user_template,
            &TemplateVars {
                title: input.title,
                content: &truncated,
                content_type,
                hints,
            },
        );

        let request = CompletionRequest {
            system: &template.system_text,
            user: &user,
            temperature: template.temperature,
            model: &self.model,
        };

        let use_search = template.web_search_enabled && self.web_search_allowed;
        debug!(analyzer = %kind, model = %self.model, use_search, "analyzer invocation");

        let started_wall = Utc::now();
        let started = Instant::now();
        let completion = if use_search {
            self.lm.complete_with_search(request).await
        } else {
            self.lm.complete(request).await
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &completion {
            warn!(analyzer = %kind, "analyzer LM call failed: {e}");
        }

        Invocation {
            kind,
            template,
            completion,
            execution_id: Uuid::new_v4(),
            started_wall,
            elapsed_ms,
        }
    }
}

/// The raw outcome of one LM invocation before parsing.
pub(crate) struct Invocation {
    pub kind: AnalyzerKind,
    pub template: PromptTemplate,
    pub completion: Result<Completion, LmError>,
    pub execution_id: Uuid,
    pub started_wall: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl Invocation {
    /// Attribution for this invocation, success or failure.
    pub fn attribution(&self, model: &str) -> Attribution {
        let (web_search_used, token_count, duration_ms, error_kind) = match &self.completion {
            Ok(completion) => (
                completion.web_search_used,
                completion.token_count,
                completion.latency_ms,
                None,
            ),
            Err(e) => (false, 0, self.elapsed_ms, Some(e.kind().to_string())),
        };
        Attribution {
            execution_id: self.execution_id,
            prompt_id: self.template.id.clone(),
            prompt_name: self.template.name.clone(),
            prompt_version: self.template.version,
            prompt_source: self.template.source,
            temperature: self.template.temperature,
            model: model.to_string(),
            web_search_used,
            duration_ms,
            token_count,
            timestamp: self.started_wall,
            error_kind,
        }
    }
}

/// The result for an invocation whose LM call failed.
pub(crate) fn failed_result(
    kind: AnalyzerKind,
    attribution: Attribution,
    error: &LmError,
) -> AnalyzerResult {
    AnalyzerResult {
        kind,
        payload: AnalyzerPayload::Failed {
            error_kind: error.kind().to_string(),
            message: error.to_string(),
        },
        attribution,
        quality_subscore: None,
    }
}

/// Truncates at a char boundary, marking the cut so the model knows the
/// document continues.
pub(crate) fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push_str("\n[content truncated]");
    truncated
}
