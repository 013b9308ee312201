//! Classifier: assigns a content type from the configured taxonomy plus AI
//! primitives, an optional vendor, and a confidence. Runs first so every
//! later analyzer can route its prompt by content type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    parse, Analyzer, AnalyzerEngine, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult,
};

/// Content fed to the classifier; a slice is enough to pick a category.
const CLASSIFIER_CHAR_BUDGET: usize = 6_000;

const MAX_AI_PRIMITIVES: usize = 3;

/// The classifier's structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub content_type: String,
    pub ai_primitives: Vec<String>,
    pub vendor: Option<String>,
    pub confidence: f32,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    ai_primitives: Vec<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

pub struct ClassifierAnalyzer {
    engine: AnalyzerEngine,
    taxonomy: Vec<String>,
    vendors: Vec<String>,
    fallback: String,
}

impl ClassifierAnalyzer {
    pub fn new(
        prompts: std::sync::Arc<crate::prompt_store::PromptStore>,
        lm: std::sync::Arc<crate::providers::ai::LmClient>,
        config: &crate::config::PipelineConfig,
    ) -> Self {
        Self {
            engine: AnalyzerEngine::from_config(
                prompts,
                lm,
                config,
                AnalyzerKind::Classifier,
                CLASSIFIER_CHAR_BUDGET,
            ),
            taxonomy: config.content_taxonomy.clone(),
            vendors: config.known_vendors.clone(),
            fallback: config.fallback_content_type.clone(),
        }
    }

    fn hints(&self) -> String {
        format!(
            "Known content types: {}\nKnown vendors: {}",
            self.taxonomy.join(", "),
            self.vendors.join(", ")
        )
    }

    /// Maps the raw model output into the closed taxonomy. An answer
    /// outside the list is replaced by the safe fallback with its
    /// confidence knocked down.
    fn sanitize(&self, raw: RawClassification) -> Classification {
        let content_type = self
            .taxonomy
            .iter()
            .find(|t| t.eq_ignore_ascii_case(raw.content_type.trim()))
            .cloned();
        let (content_type, confidence) = match content_type {
            Some(canonical) => (canonical, raw.confidence.clamp(0.0, 1.0)),
            None => {
                debug!(
                    answered = raw.content_type,
                    "classifier answered outside the taxonomy, using fallback"
                );
                (self.fallback.clone(), raw.confidence.clamp(0.0, 1.0).min(0.3))
            }
        };

        let vendor = raw.vendor.and_then(|v| {
            let v = v.trim().to_string();
            if v.is_empty() || v.eq_ignore_ascii_case("null") || v.eq_ignore_ascii_case("none") {
                return None;
            }
            // Prefer the canonical casing when the vendor is known.
            Some(
                self.vendors
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(&v))
                    .cloned()
                    .unwrap_or(v),
            )
        });

        Classification {
            content_type,
            ai_primitives: raw
                .ai_primitives
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .take(MAX_AI_PRIMITIVES)
                .collect(),
            vendor,
            confidence,
            reasoning: raw.reasoning.trim().to_string(),
        }
    }
}

#[async_trait]
impl Analyzer for ClassifierAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Classifier
    }

    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult {
        let invocation = self
            .engine
            .invoke(self.kind(), input, &self.hints())
            .await;

        let attribution = invocation.attribution(&self.engine.model);
        let completion = match &invocation.completion {
            Ok(completion) => completion,
            Err(e) => return super::failed_result(self.kind(), attribution, e),
        };

        let classification = match parse::extract_json::<RawClassification>(&completion.text) {
            Some(raw) => self.sanitize(raw),
            None => {
                debug!("classifier response was not JSON, using fallback classification");
                Classification {
                    content_type: self.fallback.clone(),
                    ai_primitives: Vec::new(),
                    vendor: None,
                    confidence: 0.0,
                    reasoning: format!(
                        "unparseable classifier response: {}",
                        parse::clamp_sentences(&completion.text, 1)
                    ),
                }
            }
        };

        let subscore = (classification.confidence * 100.0).round() as u8;
        AnalyzerResult {
            kind: self.kind(),
            payload: AnalyzerPayload::Classification(classification),
            attribution,
            quality_subscore: Some(subscore),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer_for_tests() -> (Vec<String>, Vec<String>) {
        (
            vec!["Market News".into(), "Research Paper".into(), "Other".into()],
            vec!["OpenAI".into(), "Anthropic".into()],
        )
    }

    fn sanitize(raw: RawClassification) -> Classification {
        let (taxonomy, vendors) = analyzer_for_tests();
        // The engine is irrelevant to sanitization; build the pieces by hand.
        let clf = ClassifierAnalyzer {
            engine: AnalyzerEngine {
                prompts: std::sync::Arc::new(crate::prompt_store::PromptStore::builtin_only()),
                lm: std::sync::Arc::new(crate::providers::ai::LmClient::new(
                    Box::new(
                        crate::providers::ai::LocalAiProvider::new(
                            "http://localhost:0".into(),
                            None,
                            std::time::Duration::from_secs(1),
                        )
                        .unwrap(),
                    ),
                    crate::retry::RetryPolicy::provider(),
                    std::time::Duration::ZERO,
                )),
                model: "test".into(),
                web_search_allowed: false,
                char_budget: 100,
            },
            taxonomy,
            vendors,
            fallback: "Other".into(),
        };
        clf.sanitize(raw)
    }

    #[test]
    fn out_of_taxonomy_answers_fall_back() {
        let result = sanitize(RawClassification {
            content_type: "Conspiracy Theories".into(),
            ai_primitives: vec![],
            vendor: None,
            confidence: 0.95,
            reasoning: "".into(),
        });
        assert_eq!(result.content_type, "Other");
        assert!(result.confidence <= 0.3);
    }

    #[test]
    fn taxonomy_match_is_case_insensitive_and_canonicalized() {
        let result = sanitize(RawClassification {
            content_type: "market news".into(),
            ai_primitives: vec!["RAG".into(), "  ".into(), "Agents".into(), "X".into(), "Y".into()],
            vendor: Some("anthropic".into()),
            confidence: 1.7,
            reasoning: "clear".into(),
        });
        assert_eq!(result.content_type, "Market News");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.ai_primitives, vec!["RAG", "Agents", "X"]);
        assert_eq!(result.vendor.as_deref(), Some("Anthropic"));
    }

    #[test]
    fn null_vendor_strings_become_none() {
        let result = sanitize(RawClassification {
            content_type: "Other".into(),
            ai_primitives: vec![],
            vendor: Some("null".into()),
            confidence: 0.5,
            reasoning: "".into(),
        });
        assert_eq!(result.vendor, None);
    }
}
