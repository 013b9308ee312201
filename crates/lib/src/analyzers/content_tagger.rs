//! Content-tagger: one to seven short retrieval tags in Title Case,
//! ordered by decreasing relevance. The destination store renders these as
//! chips, so overlong or duplicate tags are cleaned up regardless of what
//! the model produced.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    parse, Analyzer, AnalyzerEngine, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult,
};
use crate::config::PipelineConfig;
use crate::prompt_store::PromptStore;
use crate::providers::ai::LmClient;

const CONTENT_TAGGER_CHAR_BUDGET: usize = 8_000;

pub const MAX_CONTENT_TAGS: usize = 7;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_TAG_WORDS: usize = 4;

#[derive(Debug, Deserialize, Default)]
struct RawContentTags {
    #[serde(default)]
    tags: Vec<String>,
}

pub struct ContentTaggerAnalyzer {
    engine: AnalyzerEngine,
}

impl ContentTaggerAnalyzer {
    pub fn new(prompts: Arc<PromptStore>, lm: Arc<LmClient>, config: &PipelineConfig) -> Self {
        Self {
            engine: AnalyzerEngine::from_config(
                prompts,
                lm,
                config,
                AnalyzerKind::ContentTagger,
                CONTENT_TAGGER_CHAR_BUDGET,
            ),
        }
    }
}

#[async_trait]
impl Analyzer for ContentTaggerAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::ContentTagger
    }

    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult {
        let invocation = self.engine.invoke(self.kind(), input, "").await;

        let attribution = invocation.attribution(&self.engine.model);
        let completion = match &invocation.completion {
            Ok(completion) => completion,
            Err(e) => return super::failed_result(self.kind(), attribution, e),
        };

        // JSON first; a plain bulleted list is accepted as a fallback.
        let raw_tags = match parse::extract_json::<RawContentTags>(&completion.text) {
            Some(parsed) if !parsed.tags.is_empty() => parsed.tags,
            _ => parse::parse_bullets(&completion.text),
        };

        let tags = normalize_tags(raw_tags, input.content_type_hint);
        let subscore = score_content_tags(&tags);

        AnalyzerResult {
            kind: self.kind(),
            payload: AnalyzerPayload::ContentTags(tags),
            attribution,
            quality_subscore: Some(subscore),
        }
    }
}

/// Enforces every content-tag constraint: Title Case, at most four words
/// and fifty characters, no duplicates, between one and seven entries. The
/// model's ordering is preserved as the relevance order. When nothing
/// usable survives, the content type (or a generic tag) stands in so the
/// list is never empty.
pub fn normalize_tags(raw: Vec<String>, content_type_hint: Option<&str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tags: Vec<String> = raw
        .iter()
        .map(|tag| {
            let limited = tag
                .split_whitespace()
                .take(MAX_TAG_WORDS)
                .collect::<Vec<_>>()
                .join(" ");
            parse::title_case(&truncate_tag(&limited))
        })
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(MAX_CONTENT_TAGS)
        .collect();

    if tags.is_empty() {
        let fallback = content_type_hint.unwrap_or("General Reference");
        tags.push(parse::title_case(&truncate_tag(fallback)));
    }
    tags
}

/// Cuts a tag to the character limit at a word boundary where possible.
fn truncate_tag(tag: &str) -> String {
    if tag.chars().count() <= MAX_TAG_CHARS {
        return tag.to_string();
    }
    let hard: String = tag.chars().take(MAX_TAG_CHARS).collect();
    match hard.rfind(' ') {
        Some(cut) if cut > 0 => hard[..cut].to_string(),
        _ => hard,
    }
}

fn score_content_tags(tags: &[String]) -> u8 {
    let mut score = 40u8;
    if tags.len() >= 3 {
        score += 30;
    }
    if tags.iter().all(|t| t.chars().count() <= 30) {
        score += 30;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_are_enforced() {
        let tags = normalize_tags(
            vec![
                "quarterly earnings analysis with way too many words".into(),
                "SERVICES growth".into(),
                "services growth".into(),
                "a".repeat(80),
            ],
            None,
        );
        assert!(!tags.is_empty() && tags.len() <= MAX_CONTENT_TAGS);
        for tag in &tags {
            assert!(tag.chars().count() <= MAX_TAG_CHARS, "tag too long: {tag}");
            assert!(
                tag.split_whitespace().count() <= MAX_TAG_WORDS,
                "tag too wordy: {tag}"
            );
        }
        // Case-insensitive dedup kept only one "Services Growth".
        assert_eq!(
            tags.iter()
                .filter(|t| t.eq_ignore_ascii_case("services growth"))
                .count(),
            1
        );
    }

    #[test]
    fn empty_input_falls_back_to_content_type() {
        assert_eq!(normalize_tags(vec![], Some("Market News")), vec!["Market News"]);
        assert_eq!(normalize_tags(vec![], None), vec!["General Reference"]);
    }

    #[test]
    fn more_than_seven_tags_are_capped() {
        let raw: Vec<String> = (0..12).map(|i| format!("tag number {i}")).collect();
        assert_eq!(normalize_tags(raw, None).len(), MAX_CONTENT_TAGS);
    }
}
