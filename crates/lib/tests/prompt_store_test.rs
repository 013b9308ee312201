//! Prompt store resolution: normalized keys, the legacy-key compatibility
//! probe, and the full fallback ladder down to the built-in defaults.

mod common;

use std::io::Write;

use common::setup_tracing;
use paperbase::analyzers::AnalyzerKind;
use paperbase::prompt_store::{cache_key, PromptStore, RemotePromptRow};
use paperbase::prompts::{PromptTemplate, TemplateSource};
use paperbase_test_utils::StaticPromptSource;

fn remote_template(name: &str) -> PromptTemplate {
    PromptTemplate {
        id: format!("remote/{name}"),
        name: name.to_string(),
        system_text: "remote system".into(),
        user_template: "Summarize {title}\n{content}".into(),
        temperature: 0.1,
        web_search_enabled: false,
        quality_threshold: Some(70),
        version: 2,
        source: TemplateSource::Remote,
    }
}

#[tokio::test]
async fn normalized_key_hit_takes_precedence() {
    setup_tracing();
    let store = PromptStore::builtin_only().with_remote(Box::new(StaticPromptSource(vec![
        RemotePromptRow {
            content_type: "Market News".into(),
            analyzer: "summarizer".into(),
            legacy_key: None,
            template: remote_template("normalized"),
        },
    ])));
    store.refresh().await.unwrap();

    let resolved = store.get("Market News", AnalyzerKind::Summarizer);
    assert_eq!(resolved.name, "normalized");
    assert_eq!(resolved.source, TemplateSource::Remote);
    assert_eq!(
        cache_key("Market News", AnalyzerKind::Summarizer),
        "market_news_summarizer"
    );
}

/// A row registered under the pre-normalization key "market news_summarizer"
/// is still found for ("Market News", summarizer).
#[tokio::test]
async fn legacy_key_probe_finds_unnormalized_rows() {
    setup_tracing();
    let store = PromptStore::builtin_only().with_remote(Box::new(StaticPromptSource(vec![
        RemotePromptRow {
            content_type: "market news".into(),
            analyzer: "summarizer".into(),
            legacy_key: Some("market news_summarizer".into()),
            template: remote_template("legacy"),
        },
    ])));
    store.refresh().await.unwrap();

    let resolved = store.get("Market News", AnalyzerKind::Summarizer);
    assert_eq!(resolved.name, "legacy", "legacy key probe should hit");

    // A different content type misses the legacy row and falls through.
    let other = store.get("Research Paper", AnalyzerKind::Summarizer);
    assert_eq!(other.source, TemplateSource::Local);
}

#[tokio::test]
async fn local_file_backs_missing_remote_entries() {
    setup_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
- content_type: Research Paper
  analyzer: summarizer
  name: Paper summarizer
  system: You summarize academic papers.
  user: "Summarize {{title}}: {{content}}"
  temperature: 0.2
  version: 3
- content_type: default
  analyzer: insights
  name: Fallback insights
  system: You list insights.
  user: "Insights for {{title}}: {{content}}"
"#
    )
    .unwrap();

    let store = PromptStore::builtin_only()
        .with_local_file(file.path())
        .unwrap();

    let paper = store.get("Research Paper", AnalyzerKind::Summarizer);
    assert_eq!(paper.name, "Paper summarizer");
    assert_eq!(paper.version, 3);
    assert_eq!(paper.source, TemplateSource::Local);

    // Unknown content type falls back to the local default entry.
    let insights = store.get("Market News", AnalyzerKind::Insights);
    assert_eq!(insights.name, "Fallback insights");
}

#[tokio::test]
async fn builtin_default_is_the_last_rung() {
    setup_tracing();
    let store = PromptStore::builtin_only();
    for kind in AnalyzerKind::all() {
        let template = store.get("Totally Unknown Type", *kind);
        assert_eq!(template.source, TemplateSource::Local);
        assert!(template.id.starts_with("builtin/"));
        assert!(!template.user_template.is_empty());
    }
}

#[tokio::test]
async fn local_file_with_bad_placeholder_fails_load() {
    setup_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
- content_type: default
  analyzer: summarizer
  system: s
  user: "Use {{bogus_variable}} here"
"#
    )
    .unwrap();

    let result = PromptStore::builtin_only().with_local_file(file.path());
    assert!(result.is_err(), "unknown placeholders must fail at load time");
}
