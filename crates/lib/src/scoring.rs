//! # Quality Scoring
//!
//! Two scorers live here. The primary one composes a 0–100 score from the
//! analyzer outputs of a freshly processed document (relevance 0–40,
//! completeness 0–30, actionability 0–30). The secondary, proxy scorer
//! estimates quality from stored page metadata alone, for pages written
//! before explicit scores existed; its estimates carry a wider similarity
//! tolerance to reflect the lower confidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analyzers::{AnalyzerKind, AnalyzerPayload, AnalyzerResult, Classification};
use crate::extract::ExtractedText;
use crate::notestore::{PageProperties, PageStatus};

/// Visual tier thresholds from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIndicator {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityIndicator {
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => QualityIndicator::Excellent,
            70..=84 => QualityIndicator::Good,
            50..=69 => QualityIndicator::Fair,
            _ => QualityIndicator::Poor,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            QualityIndicator::Excellent => "🌟",
            QualityIndicator::Good => "✅",
            QualityIndicator::Fair => "⚡",
            QualityIndicator::Poor => "⚠️",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityIndicator::Excellent => "Excellent",
            QualityIndicator::Good => "Good",
            QualityIndicator::Fair => "Fair",
            QualityIndicator::Poor => "Poor",
        }
    }
}

/// Composite score for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityScore {
    pub overall: u8,
    pub relevance: u8,
    pub completeness: u8,
    pub actionability: u8,
    pub indicator: QualityIndicator,
}

/// Similarity tolerance for explicitly scored pages.
pub const EXPLICIT_SCORE_TOLERANCE: u8 = 20;

/// Similarity tolerance for proxy-scored pages.
pub const PROXY_SCORE_TOLERANCE: u8 = 30;

/// A metadata-derived estimate with its wider tolerance attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyQuality {
    pub score: u8,
    pub tolerance: u8,
}

/// First words that make an insight actionable.
const IMPERATIVE_VERBS: &[&str] = &[
    "adopt",
    "assess",
    "avoid",
    "build",
    "compare",
    "consider",
    "evaluate",
    "expect",
    "explore",
    "focus",
    "invest",
    "investigate",
    "leverage",
    "monitor",
    "plan",
    "prepare",
    "prioritize",
    "review",
    "test",
    "track",
    "use",
    "watch",
];

const POINTS_PER_IMPERATIVE: u8 = 6;

/// Scores a document from its analyzer outputs.
pub fn score_document(
    results: &BTreeMap<AnalyzerKind, AnalyzerResult>,
    extracted: &ExtractedText,
) -> QualityScore {
    if extracted.is_empty() {
        return QualityScore {
            overall: 0,
            relevance: 0,
            completeness: 0,
            actionability: 0,
            indicator: QualityIndicator::Poor,
        };
    }

    let classification = classification_of(results);
    let insights = insights_of(results);

    let relevance = relevance_score(classification, &insights);
    let completeness = completeness_score(results, &insights);
    let actionability = actionability_score(&insights);

    let overall = relevance + completeness + actionability;
    QualityScore {
        overall,
        relevance,
        completeness,
        actionability,
        indicator: QualityIndicator::from_score(overall),
    }
}

/// Relevance (0–40): how much of the classifier's vocabulary shows up in
/// the insights body, plus a bonus for confident classification.
fn relevance_score(classification: Option<&Classification>, insights: &[String]) -> u8 {
    let Some(classification) = classification else {
        return 0;
    };

    let mut terms: Vec<String> = classification
        .content_type
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    terms.extend(classification.ai_primitives.iter().map(|p| p.to_lowercase()));
    if let Some(vendor) = &classification.vendor {
        terms.push(vendor.to_lowercase());
    }
    terms.retain(|t| t.len() > 2);
    terms.dedup();

    let body = insights.join(" ").to_lowercase();
    let overlap = if terms.is_empty() {
        0.0
    } else {
        let matched = terms.iter().filter(|t| body.contains(t.as_str())).count();
        matched as f64 / terms.len() as f64
    };

    let mut score = (overlap * 30.0).round() as u8;
    if classification.confidence >= 0.7 {
        score += 10;
    }
    score.min(40)
}

/// Completeness (0–30): 10 points each for a non-empty summary, non-empty
/// insights, and at least three tags across all tag lists.
fn completeness_score(
    results: &BTreeMap<AnalyzerKind, AnalyzerResult>,
    insights: &[String],
) -> u8 {
    let mut score = 0u8;

    let summary_present = matches!(
        results.get(&AnalyzerKind::Summarizer).map(|r| &r.payload),
        Some(AnalyzerPayload::Summary(s)) if !s.trim().is_empty()
    );
    if summary_present {
        score += 10;
    }

    if !insights.is_empty() {
        score += 10;
    }

    let mut tag_count = 0usize;
    if let Some(AnalyzerPayload::ContentTags(tags)) =
        results.get(&AnalyzerKind::ContentTagger).map(|r| &r.payload)
    {
        tag_count += tags.len();
    }
    if let Some(AnalyzerPayload::Tags { topical, domain }) =
        results.get(&AnalyzerKind::Tagger).map(|r| &r.payload)
    {
        tag_count += topical.len() + domain.len();
    }
    if tag_count >= 3 {
        score += 10;
    }

    score.min(30)
}

/// Actionability (0–30): six points per imperative-voice insight sentence.
fn actionability_score(insights: &[String]) -> u8 {
    let mut imperatives = 0u32;
    for insight in insights {
        for sentence in insight.split_inclusive(['.', '!', '?']) {
            let first = sentence
                .split_whitespace()
                .next()
                .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase());
            if let Some(word) = first {
                if IMPERATIVE_VERBS.contains(&word.as_str()) {
                    imperatives += 1;
                }
            }
        }
    }
    ((imperatives * POINTS_PER_IMPERATIVE as u32).min(30)) as u8
}

/// Average of the per-analyzer subscores, used in the attribution display.
pub fn analyzer_quality(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Option<u8> {
    let subscores: Vec<u8> = results
        .values()
        .filter_map(|r| r.quality_subscore)
        .collect();
    if subscores.is_empty() {
        return None;
    }
    let sum: u32 = subscores.iter().map(|&s| s as u32).sum();
    Some((sum / subscores.len() as u32) as u8)
}

/// Estimates quality from stored metadata alone: tag richness weighted by
/// hierarchy, processing status, vendor presence, and recency.
pub fn proxy_score(properties: &PageProperties) -> ProxyQuality {
    let mut score = 0u32;

    // Tag richness by hierarchy: content tags are the strongest signal.
    score += (properties.content_tags.len() as u32 * 4).min(20);
    score += (properties.topical_tags.len() as u32 * 3).min(12);
    score += (properties.domain_tags.len() as u32 * 2).min(8);

    score += match properties.status {
        PageStatus::Enriched => 25,
        PageStatus::Inbox => 10,
        PageStatus::Failed => 0,
    };

    if properties.vendor.is_some() {
        score += 10;
    }

    // Title length as the only available content-size signal.
    if properties.title.split_whitespace().count() >= 4 {
        score += 10;
    }

    let age_days = (chrono::Utc::now() - properties.created_date).num_days();
    score += match age_days {
        d if d <= 30 => 15,
        d if d <= 180 => 10,
        _ => 5,
    };

    ProxyQuality {
        score: score.min(100) as u8,
        tolerance: PROXY_SCORE_TOLERANCE,
    }
}

fn classification_of(
    results: &BTreeMap<AnalyzerKind, AnalyzerResult>,
) -> Option<&Classification> {
    match results.get(&AnalyzerKind::Classifier).map(|r| &r.payload) {
        Some(AnalyzerPayload::Classification(c)) => Some(c),
        _ => None,
    }
}

fn insights_of(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Vec<String> {
    match results.get(&AnalyzerKind::Insights).map(|r| &r.payload) {
        Some(AnalyzerPayload::Insights(items)) => items.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_thresholds() {
        assert_eq!(QualityIndicator::from_score(85), QualityIndicator::Excellent);
        assert_eq!(QualityIndicator::from_score(84), QualityIndicator::Good);
        assert_eq!(QualityIndicator::from_score(70), QualityIndicator::Good);
        assert_eq!(QualityIndicator::from_score(69), QualityIndicator::Fair);
        assert_eq!(QualityIndicator::from_score(50), QualityIndicator::Fair);
        assert_eq!(QualityIndicator::from_score(49), QualityIndicator::Poor);
    }

    #[test]
    fn actionability_caps_at_thirty() {
        let insights: Vec<String> = (0..10)
            .map(|i| format!("Monitor the metric {i} closely."))
            .collect();
        assert_eq!(actionability_score(&insights), 30);
        assert_eq!(actionability_score(&["The sky is blue.".to_string()]), 0);
    }

    #[test]
    fn confident_classifier_contributes_ten_relevance_points() {
        let classification = Classification {
            content_type: "Market News".into(),
            ai_primitives: vec![],
            vendor: None,
            confidence: 0.9,
            reasoning: String::new(),
        };
        // No overlap at all: only the confidence bonus remains.
        let score = relevance_score(Some(&classification), &["unrelated".into()]);
        assert_eq!(score, 10);
    }

    #[test]
    fn proxy_scoring_rewards_tag_hierarchy_and_status() {
        let rich = PageProperties {
            title: "A Long Detailed Research Title".into(),
            fingerprint: "fp".into(),
            status: PageStatus::Enriched,
            content_type: Some("Research Paper".into()),
            vendor: Some("OpenAI".into()),
            ai_primitives: vec![],
            topical_tags: vec!["A".into(), "B".into()],
            domain_tags: vec!["C".into()],
            content_tags: vec!["D".into(), "E".into(), "F".into()],
            quality_score: None,
            drive_url: None,
            created_date: chrono::Utc::now(),
        };
        let estimate = proxy_score(&rich);
        assert!(estimate.score >= 70, "got {}", estimate.score);
        assert_eq!(estimate.tolerance, PROXY_SCORE_TOLERANCE);

        let bare = PageProperties {
            title: "x".into(),
            status: PageStatus::Failed,
            vendor: None,
            topical_tags: vec![],
            domain_tags: vec![],
            content_tags: vec![],
            created_date: chrono::Utc::now() - chrono::Duration::days(400),
            ..rich
        };
        assert!(proxy_score(&bare).score < 20);
    }
}
