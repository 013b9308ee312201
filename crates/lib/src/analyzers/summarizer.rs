//! Summarizer: produces the markdown summary shown at the top of the page.
//! Output is sanitized to the destination store's markdown subset (H2/H3
//! only, no raw URLs) and scored on length, structure, and bullet
//! discipline.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::{
    parse, Analyzer, AnalyzerEngine, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult,
};
use crate::config::PipelineConfig;
use crate::prompt_store::PromptStore;
use crate::providers::ai::LmClient;

const SUMMARIZER_CHAR_BUDGET: usize = 12_000;

/// Word-count band the subscore rewards; the prompt asks for ≤400 words.
const TARGET_WORDS: std::ops::Range<usize> = 120..450;

pub struct SummarizerAnalyzer {
    engine: AnalyzerEngine,
}

impl SummarizerAnalyzer {
    pub fn new(prompts: Arc<PromptStore>, lm: Arc<LmClient>, config: &PipelineConfig) -> Self {
        Self {
            engine: AnalyzerEngine::from_config(
                prompts,
                lm,
                config,
                AnalyzerKind::Summarizer,
                SUMMARIZER_CHAR_BUDGET,
            ),
        }
    }
}

#[async_trait]
impl Analyzer for SummarizerAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Summarizer
    }

    async fn analyze(&self, input: AnalyzerInput<'_>) -> AnalyzerResult {
        let invocation = self.engine.invoke(self.kind(), input, "").await;

        let attribution = invocation.attribution(&self.engine.model);
        let completion = match &invocation.completion {
            Ok(completion) => completion,
            Err(e) => return super::failed_result(self.kind(), attribution, e),
        };

        let markdown = sanitize_summary(&completion.text);
        let subscore = score_summary(&markdown);

        AnalyzerResult {
            kind: self.kind(),
            payload: AnalyzerPayload::Summary(markdown),
            attribution,
            quality_subscore: Some(subscore),
        }
    }
}

/// Brings model output into the allowed markdown subset: fences stripped
/// when they wrap the whole answer, H1 demoted to H2, deeper headings
/// promoted to H3, bare URLs removed, markdown links reduced to their text.
pub fn sanitize_summary(raw: &str) -> String {
    let text = parse::strip_fences(raw);

    let link = Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap();
    let bare_url = Regex::new(r"https?://\S+").unwrap();
    let text = link.replace_all(&text, "$1");
    let text = bare_url.replace_all(&text, "");

    let deep_heading = Regex::new(r"^#{4,}\s").unwrap();
    text.lines()
        .map(|line| {
            let trimmed = line.trim_end();
            if deep_heading.is_match(trimmed) {
                format!("### {}", trimmed.trim_start_matches('#').trim_start())
            } else if trimmed.starts_with("# ") {
                format!("##{}", &trimmed[1..])
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Heuristic subscore: word count inside the target band, at least one
/// heading, and a healthy share of bullet lines.
pub fn score_summary(markdown: &str) -> u8 {
    let words = markdown.split_whitespace().count();
    let mut score = 0u8;

    if TARGET_WORDS.contains(&words) {
        score += 40;
    } else if words > 0 {
        score += 20;
    }

    if markdown.lines().any(|l| l.starts_with("## ") || l.starts_with("### ")) {
        score += 30;
    }

    let lines: Vec<&str> = markdown.lines().filter(|l| !l.trim().is_empty()).collect();
    let bullet_lines = lines
        .iter()
        .filter(|l| l.trim_start().starts_with("- ") || l.trim_start().starts_with("* "))
        .count();
    if !lines.is_empty() && bullet_lines * 3 >= lines.len() {
        score += 30;
    }

    score
}
