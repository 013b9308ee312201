//! Tagger: two disjoint lists. Topical tags name what the document
//! discusses, domain tags the field it belongs to.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    parse, Analyzer, AnalyzerEngine, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult,
};
use crate::config::PipelineConfig;
use crate::prompt_store::PromptStore;
use crate::providers::ai::LmClient;

const TAGGER_CHAR_BUDGET: usize = 8_000;

const MAX_TAGS_PER_LIST: usize = 5;

#[derive(Debug, Deserialize, Default)]
struct RawTags {
    #[serde(default)]
    topical_tags: Vec<String>,
    #[serde(default)]
    domain_tags: Vec<String>,
}

pub struct TaggerAnalyzer {
    engine: AnalyzerEngine,
}

impl TaggerAnalyzer {
    pub fn new(prompts: Arc<PromptStore>, lm: Arc<LmClient>, config: &PipelineConfig) -> Self {
        Self {
            engine: AnalyzerEngine::from_config(
                prompts,
                lm,
                config,
                AnalyzerKind::Tagger,
                TAGGER_CHAR_BUDGET,
            ),
        }
    }
}

#[async_trait]
impl Analyzer for TaggerAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Tagger
    }

    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult {
        let invocation = self.engine.invoke(self.kind(), input, "").await;

        let attribution = invocation.attribution(&self.engine.model);
        let completion = match &invocation.completion {
            Ok(completion) => completion,
            Err(e) => return super::failed_result(self.kind(), attribution, e),
        };

        let raw = parse::extract_json::<RawTags>(&completion.text).unwrap_or_default();
        let (topical, domain) = disjoint_tags(raw.topical_tags, raw.domain_tags);

        let subscore = score_tags(&topical, &domain);
        AnalyzerResult {
            kind: self.kind(),
            payload: AnalyzerPayload::Tags { topical, domain },
            attribution,
            quality_subscore: Some(subscore),
        }
    }
}

/// Cleans both lists and removes from the domain list anything already
/// present topically, keeping the two disjoint.
pub fn disjoint_tags(topical: Vec<String>, domain: Vec<String>) -> (Vec<String>, Vec<String>) {
    let topical = clean_list(topical);
    let lowered: std::collections::HashSet<String> =
        topical.iter().map(|t| t.to_lowercase()).collect();
    let domain = clean_list(domain)
        .into_iter()
        .filter(|tag| !lowered.contains(&tag.to_lowercase()))
        .collect();
    (topical, domain)
}

fn clean_list(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|tag| parse::title_case(tag.trim()))
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(MAX_TAGS_PER_LIST)
        .collect()
}

fn score_tags(topical: &[String], domain: &[String]) -> u8 {
    let mut score = 0u8;
    if !topical.is_empty() {
        score += 40;
    }
    if !domain.is_empty() {
        score += 30;
    }
    if topical.len() + domain.len() >= 3 {
        score += 30;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_made_disjoint() {
        let (topical, domain) = disjoint_tags(
            vec!["Cloud Computing".into(), "ai chips".into()],
            vec!["AI Chips".into(), "Semiconductors".into()],
        );
        assert_eq!(topical, vec!["Cloud Computing", "Ai Chips"]);
        assert_eq!(domain, vec!["Semiconductors"]);
    }

    #[test]
    fn duplicates_and_blanks_are_cleaned() {
        let (topical, _) = disjoint_tags(
            vec!["RAG".into(), " rag ".into(), "".into(), "Agents".into()],
            vec![],
        );
        assert_eq!(topical, vec!["RAG", "Agents"]);
    }
}
