//! Insights: a bulleted list of distinct, non-obvious observations. The
//! only analyzer that uses the web-search endpoint by default, so current
//! context can inform the bullets; degradation to plain completion is
//! recorded in attribution by the LM client.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    parse, Analyzer, AnalyzerEngine, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult,
};
use crate::config::PipelineConfig;
use crate::prompt_store::PromptStore;
use crate::providers::ai::LmClient;

const INSIGHTS_CHAR_BUDGET: usize = 12_000;

/// Bullets beyond this are almost always restatements; cap hard.
const MAX_INSIGHTS: usize = 10;

const MAX_SENTENCES_PER_INSIGHT: usize = 2;

pub struct InsightsAnalyzer {
    engine: AnalyzerEngine,
}

impl InsightsAnalyzer {
    pub fn new(prompts: Arc<PromptStore>, lm: Arc<LmClient>, config: &PipelineConfig) -> Self {
        Self {
            engine: AnalyzerEngine::from_config(
                prompts,
                lm,
                config,
                AnalyzerKind::Insights,
                INSIGHTS_CHAR_BUDGET,
            ),
        }
    }
}

#[async_trait]
impl Analyzer for InsightsAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Insights
    }

    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult {
        let invocation = self.engine.invoke(self.kind(), input, "").await;

        let attribution = invocation.attribution(&self.engine.model);
        let completion = match &invocation.completion {
            Ok(completion) => completion,
            Err(e) => return super::failed_result(self.kind(), attribution, e),
        };

        let insights = clean_insights(&completion.text);
        let subscore = score_insights(&insights);

        AnalyzerResult {
            kind: self.kind(),
            payload: AnalyzerPayload::Insights(insights),
            attribution,
            quality_subscore: Some(subscore),
        }
    }
}

/// Parses bullets, clamps each to two sentences, and drops duplicates
/// while preserving the model's relevance ordering.
pub fn clean_insights(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    parse::parse_bullets(raw)
        .into_iter()
        .map(|bullet| parse::clamp_sentences(&bullet, MAX_SENTENCES_PER_INSIGHT))
        .filter(|bullet| !bullet.is_empty())
        .filter(|bullet| seen.insert(bullet.to_lowercase()))
        .take(MAX_INSIGHTS)
        .collect()
}

/// Subscore: rewards having several distinct bullets and keeping them
/// tight (median under ~220 chars).
pub fn score_insights(insights: &[String]) -> u8 {
    if insights.is_empty() {
        return 0;
    }
    let mut score = 40u8;
    if insights.len() >= 3 {
        score += 30;
    }
    let long = insights.iter().filter(|i| i.len() > 220).count();
    if long * 2 <= insights.len() {
        score += 30;
    }
    score
}
