//! Formatter invariants: deterministic section order, the top-level block
//! cap, the per-block character limit (including children), empty-section
//! omission, and the minimal layout.

use std::collections::BTreeMap;

use chrono::Utc;
use paperbase::analyzers::{
    AnalyzerKind, AnalyzerPayload, AnalyzerResult, Attribution, Classification,
};
use paperbase::attribution::AttributionRecord;
use paperbase::extract::ExtractedText;
use paperbase::format::{build_page_blocks, Block, FormatOptions, PageRender};
use paperbase::prompts::TemplateSource;
use paperbase::scoring::{QualityIndicator, QualityScore};
use uuid::Uuid;

fn attribution(kind: AnalyzerKind) -> Attribution {
    Attribution {
        execution_id: Uuid::new_v4(),
        prompt_id: format!("prompt/{kind}"),
        prompt_name: format!("{kind} prompt"),
        prompt_version: 1,
        prompt_source: TemplateSource::Remote,
        temperature: 0.0,
        model: "test-model".into(),
        web_search_used: false,
        duration_ms: 12,
        token_count: 100,
        timestamp: Utc::now(),
        error_kind: None,
    }
}

fn result(kind: AnalyzerKind, payload: AnalyzerPayload) -> AnalyzerResult {
    AnalyzerResult {
        kind,
        payload,
        attribution: attribution(kind),
        quality_subscore: Some(80),
    }
}

fn full_results() -> BTreeMap<AnalyzerKind, AnalyzerResult> {
    let mut results = BTreeMap::new();
    results.insert(
        AnalyzerKind::Classifier,
        result(
            AnalyzerKind::Classifier,
            AnalyzerPayload::Classification(Classification {
                content_type: "Market News".into(),
                ai_primitives: vec!["RAG".into()],
                vendor: Some("Apple".into()),
                confidence: 0.9,
                reasoning: "clear earnings coverage".into(),
            }),
        ),
    );
    results.insert(
        AnalyzerKind::Summarizer,
        result(
            AnalyzerKind::Summarizer,
            AnalyzerPayload::Summary("## Overview\n- grew fast\n- margins held".into()),
        ),
    );
    results.insert(
        AnalyzerKind::Insights,
        result(
            AnalyzerKind::Insights,
            AnalyzerPayload::Insights(vec!["Watch services.".into(), "Margins matter.".into()]),
        ),
    );
    results.insert(
        AnalyzerKind::Tagger,
        result(
            AnalyzerKind::Tagger,
            AnalyzerPayload::Tags {
                topical: vec!["Earnings".into()],
                domain: vec!["Consumer Tech".into()],
            },
        ),
    );
    results.insert(
        AnalyzerKind::ContentTagger,
        result(
            AnalyzerKind::ContentTagger,
            AnalyzerPayload::ContentTags(vec!["Apple Earnings".into()]),
        ),
    );
    results
}

fn score() -> QualityScore {
    QualityScore {
        overall: 88,
        relevance: 38,
        completeness: 30,
        actionability: 20,
        indicator: QualityIndicator::Excellent,
    }
}

fn records(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Vec<AttributionRecord> {
    results
        .values()
        .map(|r| AttributionRecord::from_result("fp", r))
        .collect()
}

fn extracted() -> ExtractedText {
    ExtractedText {
        text: "body".into(),
        extractor_used: "pdf-ops".into(),
    }
}

/// Every text leaf in the tree, children included.
fn walk_char_lens(blocks: &[Block], out: &mut Vec<usize>) {
    for block in blocks {
        out.push(block.text_char_len());
        match block {
            Block::Callout { children, .. } | Block::Toggle { children, .. } => {
                walk_char_lens(children, out)
            }
            _ => {}
        }
    }
}

#[test]
fn sections_appear_in_deterministic_order() {
    let results = full_results();
    let record_list = records(&results);
    let ext = extracted();
    let render = PageRender {
        title: "Apple Q3",
        origin: "drive",
        drive_url: Some("https://drive.example.com/f/1"),
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: Some(80),
        attributions: &record_list,
    };
    let blocks = build_page_blocks(&render, &FormatOptions::default());

    // banner → quality → summary → insights → classification → attribution → link
    assert!(matches!(&blocks[0], Block::Callout { emoji, .. } if emoji == "📄"));
    assert!(matches!(&blocks[1], Block::Callout { emoji, .. } if emoji == "🌟"));
    assert!(matches!(&blocks[2], Block::Callout { text, .. } if text.to_plain_string() == "Summary"));
    assert!(
        matches!(&blocks[3], Block::Toggle { title, .. } if title.to_plain_string().contains("Key Insights"))
    );
    assert!(
        matches!(&blocks[4], Block::Toggle { title, .. } if title.to_plain_string().contains("Classification"))
    );
    assert!(
        matches!(&blocks[5], Block::Toggle { title, .. } if title.to_plain_string().contains("Attribution"))
    );
    assert!(matches!(&blocks[6], Block::Bookmark { url } if url.contains("drive.example.com")));

    // Building again from the same inputs yields the same sequence.
    let again = build_page_blocks(&render, &FormatOptions::default());
    assert_eq!(blocks, again);
}

#[test]
fn block_cap_is_enforced() {
    let results = full_results();
    let record_list = records(&results);
    let ext = extracted();
    let render = PageRender {
        title: "t",
        origin: "local",
        drive_url: Some("https://example.com"),
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: None,
        attributions: &record_list,
    };
    let options = FormatOptions {
        max_blocks: 3,
        enhanced: true,
    };
    let blocks = build_page_blocks(&render, &options);
    assert_eq!(blocks.len(), 3);
}

#[test]
fn no_text_leaf_exceeds_the_store_limit() {
    let mut results = full_results();
    // A degenerate summary: one enormous unbroken paragraph.
    let huge = "A fairly long sentence that will be repeated many times over. ".repeat(200);
    results.insert(
        AnalyzerKind::Summarizer,
        result(AnalyzerKind::Summarizer, AnalyzerPayload::Summary(huge)),
    );
    let record_list = records(&results);
    let ext = extracted();
    let render = PageRender {
        title: "t",
        origin: "drive",
        drive_url: None,
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: None,
        attributions: &record_list,
    };
    let blocks = build_page_blocks(&render, &FormatOptions::default());

    let mut lens = Vec::new();
    walk_char_lens(&blocks, &mut lens);
    assert!(lens.iter().all(|&len| len <= 2000), "lens: {lens:?}");
}

#[test]
fn empty_sections_are_omitted() {
    let mut results = BTreeMap::new();
    results.insert(
        AnalyzerKind::Summarizer,
        result(AnalyzerKind::Summarizer, AnalyzerPayload::Summary("  ".into())),
    );
    results.insert(
        AnalyzerKind::Insights,
        result(AnalyzerKind::Insights, AnalyzerPayload::Insights(vec![])),
    );
    let ext = extracted();
    let render = PageRender {
        title: "t",
        origin: "local",
        drive_url: None,
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: None,
        attributions: &[],
    };
    let blocks = build_page_blocks(&render, &FormatOptions::default());

    for block in &blocks {
        if let Block::Toggle { title, .. } = block {
            let t = title.to_plain_string();
            assert!(
                !t.contains("Key Insights") && !t.contains("Attribution"),
                "empty sections must not be emitted: {t}"
            );
        }
        if let Block::Callout { text, .. } = block {
            assert_ne!(text.to_plain_string(), "Summary");
        }
    }
}

#[test]
fn attribution_rows_render_prompt_links_and_failures() {
    let results = full_results();
    let mut record_list = records(&results);
    record_list[0].error_kind = Some("timeout".into());
    let ext = extracted();
    let render = PageRender {
        title: "t",
        origin: "drive",
        drive_url: None,
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: Some(75),
        attributions: &record_list,
    };
    let blocks = build_page_blocks(&render, &FormatOptions::default());

    let toggle = blocks
        .iter()
        .find_map(|b| match b {
            Block::Toggle { title, children }
                if title.to_plain_string().contains("Attribution") =>
            {
                Some(children)
            }
            _ => None,
        })
        .expect("attribution toggle present");

    let bullets: Vec<String> = toggle
        .iter()
        .filter_map(|b| match b {
            Block::Bullet(text) => Some(text.to_plain_string()),
            _ => None,
        })
        .collect();
    assert_eq!(bullets.len(), 5);
    assert!(bullets.iter().any(|b| b.contains("failed (timeout)")));

    // Remote prompts are deep links.
    let linked = toggle.iter().any(|b| match b {
        Block::Bullet(text) => text.0.iter().any(|span| {
            span.href
                .as_deref()
                .map(|url| url.starts_with("https://www.notion.so/"))
                .unwrap_or(false)
        }),
        _ => false,
    });
    assert!(linked, "remote prompt names must be deep-linked");

    // The tier emoji heads the analyzer-quality line.
    let quality_line = toggle.iter().any(|b| match b {
        Block::Paragraph(text) => text.to_plain_string().contains("Analyzer quality: 75/100"),
        _ => false,
    });
    assert!(quality_line);
}

#[test]
fn minimal_formatter_is_spartan() {
    let results = full_results();
    let record_list = records(&results);
    let ext = extracted();
    let render = PageRender {
        title: "t",
        origin: "drive",
        drive_url: Some("https://example.com/doc"),
        extracted: &ext,
        results: &results,
        score: score(),
        analyzer_quality: None,
        attributions: &record_list,
    };
    let options = FormatOptions {
        max_blocks: 15,
        enhanced: false,
    };
    let blocks = build_page_blocks(&render, &options);

    assert!(blocks
        .iter()
        .all(|b| matches!(b, Block::Paragraph(_) | Block::Bookmark { .. })));
    assert!(matches!(blocks.last(), Some(Block::Bookmark { .. })));
}
