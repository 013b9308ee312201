//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use paperbase::analyzers::AnalyzerKind;
use paperbase::attribution::AttributionTracker;
use paperbase::config::PipelineConfig;
use paperbase::notestore::NoteStore;
use paperbase::pipeline::{CancellationFlag, Pipeline};
use paperbase::prompt_store::PromptStore;
use paperbase::providers::ai::LmClient;
use paperbase::retry::RetryPolicy;
use paperbase_test_utils::{MemoryNoteStore, MockLmProvider};

pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A configuration with no environment dependencies and no pacing delays.
pub fn test_config() -> PipelineConfig {
    let mut analyzer_web_search = HashMap::new();
    for kind in AnalyzerKind::all() {
        analyzer_web_search.insert(*kind, true);
    }
    PipelineConfig {
        notion_token: "test-token".into(),
        notion_version: "2022-06-28".into(),
        sources_db_id: "sources-db".into(),
        prompts_db_id: None,
        ai_api_key: "test-key".into(),
        local_ai_api_url: None,
        model_classifier: "small-model".into(),
        model_summary: "large-model".into(),
        model_insights: "large-model".into(),
        enhanced_formatting: true,
        enable_web_search: true,
        analyzer_web_search,
        deeplink_dedup: false,
        rate_limit_delay: Duration::ZERO,
        provider_delay: Duration::ZERO,
        max_blocks: 15,
        min_quality_score: 0,
        analyzer_pool: 5,
        document_parallelism: 1,
        provider_timeout: Duration::from_secs(5),
        store_timeout: Duration::from_secs(5),
        document_timeout: Duration::from_secs(60),
        content_taxonomy: vec![
            "Market News".into(),
            "Research Paper".into(),
            "Other".into(),
        ],
        known_vendors: vec!["OpenAI".into(), "Anthropic".into(), "Apple".into()],
        fallback_content_type: "Other".into(),
        local_prompts_path: None,
        download_dir: "downloads".into(),
        dry_run: false,
        skip_enrichment: false,
    }
}

/// Programs responses for all five analyzers, keyed on distinctive
/// substrings of the built-in system prompts.
pub fn program_happy_responses(provider: &MockLmProvider) {
    provider.add_response(
        "strict document classifier",
        r#"{"content_type": "Market News", "ai_primitives": ["Services Growth"], "vendor": "Apple", "confidence": 0.9, "reasoning": "Earnings coverage."}"#,
    );
    provider.add_response(
        "precise technical summarizer",
        "## Overview\n- Apple reported record Q3 earnings.\n- Services drove the growth.\n- Guidance was raised.",
    );
    provider.add_response(
        "strategic insights",
        "- Monitor market reaction to Apple Services Growth next quarter.\n- Expect news coverage to focus on margin durability.\n- Consider the attach-rate implications for subscriptions.",
    );
    provider.add_response(
        "assign library tags",
        r#"{"topical_tags": ["Earnings", "Services"], "domain_tags": ["Consumer Tech"]}"#,
    );
    provider.add_response(
        "retrieval tags",
        r#"{"tags": ["Apple Earnings", "Services Growth", "Q3 Results"]}"#,
    );
}

pub struct TestHarness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryNoteStore>,
    pub provider: MockLmProvider,
    pub tracker: Arc<AttributionTracker>,
    pub cancel: CancellationFlag,
}

/// Wires a pipeline around the in-memory store and the mock provider,
/// using built-in prompts and no pacing.
pub fn build_harness(config: PipelineConfig) -> TestHarness {
    let store = Arc::new(MemoryNoteStore::new());
    let provider = MockLmProvider::new();
    let tracker = Arc::new(AttributionTracker::new());
    let cancel = CancellationFlag::new();

    let lm = Arc::new(LmClient::new(
        Box::new(provider.clone()),
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
        Duration::ZERO,
    ));
    let prompts = Arc::new(PromptStore::builtin_only());

    let pipeline = Pipeline::new(
        config,
        store.clone() as Arc<dyn NoteStore>,
        prompts,
        lm,
        tracker.clone(),
        cancel.clone(),
    );

    TestHarness {
        pipeline,
        store,
        provider,
        tracker,
        cancel,
    }
}
