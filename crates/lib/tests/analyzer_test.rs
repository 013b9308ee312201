//! Analyzer-level tests: taxonomy enforcement, tag constraints, defensive
//! response parsing, failure attribution, and the web-search degradation
//! path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{setup_tracing, test_config};
use paperbase::analyzers::{
    Analyzer, AnalyzerInput, AnalyzerPayload, ClassifierAnalyzer, ContentTaggerAnalyzer,
    InsightsAnalyzer, SummarizerAnalyzer,
};
use paperbase::errors::LmError;
use paperbase::prompt_store::PromptStore;
use paperbase::providers::ai::LmClient;
use paperbase::retry::RetryPolicy;
use paperbase_test_utils::MockLmProvider;

fn lm_for(provider: &MockLmProvider) -> Arc<LmClient> {
    Arc::new(LmClient::new(
        Box::new(provider.clone()),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        Duration::ZERO,
    ))
}

fn input<'a>(text: &'a str, title: &'a str) -> AnalyzerInput<'a> {
    AnalyzerInput {
        text,
        title,
        content_type_hint: Some("Market News"),
    }
}

#[tokio::test]
async fn classifier_never_leaves_the_taxonomy() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.add_response(
        "strict document classifier",
        r#"The document looks like this: {"content_type": "Meme Collection", "ai_primitives": [], "confidence": 0.99, "reasoning": "jokes"}"#,
    );
    let config = test_config();
    let classifier =
        ClassifierAnalyzer::new(Arc::new(PromptStore::builtin_only()), lm_for(&provider), &config);

    let result = classifier.analyze(input("some text", "memes")).await;
    match result.payload {
        AnalyzerPayload::Classification(c) => {
            assert!(config.content_taxonomy.contains(&c.content_type));
            assert_eq!(c.content_type, "Other");
            assert!(c.confidence <= 0.3, "fallback classification is low-confidence");
        }
        other => panic!("expected classification, got {other:?}"),
    }
}

#[tokio::test]
async fn classifier_tolerates_fenced_json() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.add_response(
        "strict document classifier",
        "```json\n{\"content_type\": \"Market News\", \"ai_primitives\": [\"RAG\"], \"vendor\": null, \"confidence\": 0.8, \"reasoning\": \"earnings\"}\n```",
    );
    let config = test_config();
    let classifier =
        ClassifierAnalyzer::new(Arc::new(PromptStore::builtin_only()), lm_for(&provider), &config);

    let result = classifier.analyze(input("text", "t")).await;
    match result.payload {
        AnalyzerPayload::Classification(c) => {
            assert_eq!(c.content_type, "Market News");
            assert_eq!(c.vendor, None);
        }
        other => panic!("expected classification, got {other:?}"),
    }
}

#[tokio::test]
async fn content_tagger_enforces_all_constraints() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.add_response(
        "retrieval tags",
        r#"{"tags": ["one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
                    "an extremely long tag that runs on far past any sensible character limit whatsoever",
                    "ONE"]}"#,
    );
    let tagger = ContentTaggerAnalyzer::new(
        Arc::new(PromptStore::builtin_only()),
        lm_for(&provider),
        &test_config(),
    );

    let result = tagger.analyze(input("text", "t")).await;
    match result.payload {
        AnalyzerPayload::ContentTags(tags) => {
            assert!((1..=7).contains(&tags.len()));
            for tag in &tags {
                assert!(tag.chars().count() <= 50);
                assert!(tag.split_whitespace().count() <= 4);
                let first = tag.chars().next().unwrap();
                assert!(first.is_uppercase() || !first.is_alphabetic());
            }
            let mut lowered: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
            lowered.sort();
            lowered.dedup();
            assert_eq!(lowered.len(), tags.len(), "tags must be unique");
        }
        other => panic!("expected content tags, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_invocation_still_carries_attribution() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.push_failure(LmError::AuthFailed("key revoked".into()));
    let summarizer = SummarizerAnalyzer::new(
        Arc::new(PromptStore::builtin_only()),
        lm_for(&provider),
        &test_config(),
    );

    let result = summarizer.analyze(input("text", "t")).await;
    assert!(result.payload.is_failed());
    assert_eq!(result.attribution.error_kind.as_deref(), Some("auth_failed"));
    assert!(!result.attribution.prompt_name.is_empty());
    assert!(result.quality_subscore.is_none());
}

/// Scenario: the insights template wants web search but the provider's
/// search tool is unavailable. The call degrades to plain completion and
/// succeeds, with `web_search_used == false` in attribution.
#[tokio::test]
async fn search_tool_unavailable_degrades_to_plain_completion() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.disable_search_tool();
    provider.add_response(
        "strategic insights",
        "- Watch the subscription attach rate.\n- Consider supplier concentration risk.",
    );
    let insights = InsightsAnalyzer::new(
        Arc::new(PromptStore::builtin_only()),
        lm_for(&provider),
        &test_config(),
    );

    let result = insights.analyze(input("body text", "t")).await;
    match &result.payload {
        AnalyzerPayload::Insights(items) => assert_eq!(items.len(), 2),
        other => panic!("expected insights, got {other:?}"),
    }
    assert!(!result.attribution.web_search_used);
    assert!(result.attribution.error_kind.is_none(), "no error surfaced");
}

#[tokio::test]
async fn transient_provider_errors_are_retried() {
    setup_tracing();
    let provider = MockLmProvider::new();
    provider.push_failure(LmError::ProviderUnavailable("503".into()));
    provider.add_response("precise technical summarizer", "## S\n- fine now");
    let summarizer = SummarizerAnalyzer::new(
        Arc::new(PromptStore::builtin_only()),
        lm_for(&provider),
        &test_config(),
    );

    let result = summarizer.analyze(input("text", "t")).await;
    assert!(!result.payload.is_failed(), "retry should have recovered");
    assert_eq!(provider.calls().len(), 2);
}
