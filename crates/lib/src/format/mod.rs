//! # Block Formatter
//!
//! Turns the aggregated analyzer output into the destination store's block
//! sequence. Section order is fixed so pages read identically regardless
//! of which analyzer finished first: banner, quality indicator, summary,
//! key insights, classification & tags, attribution, source link. Empty
//! sections are omitted, the top-level block count is capped for mobile
//! readability, and no text leaf exceeds the store's character limit.

pub mod blocks;
pub mod markdown;

use std::collections::BTreeMap;

use tracing::warn;

use crate::analyzers::{AnalyzerKind, AnalyzerPayload, AnalyzerResult, Classification};
use crate::attribution::AttributionRecord;
use crate::extract::ExtractedText;
use crate::scoring::{QualityIndicator, QualityScore};

pub use blocks::{Block, RichText, Span};
use markdown::markdown_to_blocks;

/// Formatter controls, resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Hard cap on top-level blocks.
    pub max_blocks: usize,
    /// Enhanced layout with callouts and collapsible sections; the minimal
    /// layout is plain paragraphs for stores with spartan rendering.
    pub enhanced: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_blocks: 15,
            enhanced: true,
        }
    }
}

/// Everything the formatter needs about one processed document.
pub struct PageRender<'a> {
    pub title: &'a str,
    pub origin: &'a str,
    pub drive_url: Option<&'a str>,
    pub extracted: &'a ExtractedText,
    pub results: &'a BTreeMap<AnalyzerKind, AnalyzerResult>,
    pub score: QualityScore,
    /// Average analyzer subscore for the attribution header.
    pub analyzer_quality: Option<u8>,
    pub attributions: &'a [AttributionRecord],
}

/// Builds the page body. Always returns at most `options.max_blocks`
/// top-level blocks, each text leaf within the store's character limit.
pub fn build_page_blocks(input: &PageRender<'_>, options: &FormatOptions) -> Vec<Block> {
    let mut out = if options.enhanced {
        enhanced_blocks(input)
    } else {
        minimal_blocks(input)
    };

    if out.len() > options.max_blocks {
        warn!(
            emitted = out.len(),
            cap = options.max_blocks,
            "block cap exceeded, truncating page body"
        );
        out.truncate(options.max_blocks);
    }
    out
}

fn enhanced_blocks(input: &PageRender<'_>) -> Vec<Block> {
    let mut out = Vec::new();

    out.push(Block::Callout {
        emoji: "📄".into(),
        text: RichText::plain(clamp(&format!("{} · {}", input.title, input.origin))),
        children: Vec::new(),
    });

    if input.extracted.is_empty() {
        out.push(Block::Callout {
            emoji: "⚠️".into(),
            text: RichText::plain(
                "Content could not be extracted from the source document.",
            ),
            children: Vec::new(),
        });
    }

    out.push(quality_block(input.score));

    if let Some(summary) = summary_of(input.results) {
        out.push(Block::Callout {
            emoji: "📝".into(),
            text: RichText::plain("Summary"),
            children: markdown_to_blocks(&summary),
        });
    }

    if let Some(insights) = insights_of(input.results) {
        out.push(Block::Toggle {
            title: RichText::plain("💡 Key Insights"),
            children: insights
                .iter()
                .map(|i| Block::Bullet(RichText::plain(clamp(i))))
                .collect(),
        });
    }

    if let Some(section) = classification_section(input.results) {
        out.push(section);
    }

    if !input.attributions.is_empty() {
        out.push(attribution_section(input));
    }

    if let Some(url) = input.drive_url {
        out.push(Block::Bookmark { url: url.into() });
    }

    out
}

/// Minimal layout: the summary as plain paragraphs plus the source link.
fn minimal_blocks(input: &PageRender<'_>) -> Vec<Block> {
    let mut out = Vec::new();

    if input.extracted.is_empty() {
        out.push(Block::Paragraph(RichText::plain(
            "Content could not be extracted from the source document.",
        )));
    }

    out.push(Block::Paragraph(RichText::plain(clamp(&format!(
        "{} Quality: {}/100",
        input.score.indicator.emoji(),
        input.score.overall
    )))));

    if let Some(summary) = summary_of(input.results) {
        for chunk in blocks::split_long_text(&summary) {
            out.push(Block::Paragraph(RichText::plain(chunk)));
        }
    }

    if let Some(url) = input.drive_url {
        out.push(Block::Bookmark { url: url.into() });
    }

    out
}

fn quality_block(score: QualityScore) -> Block {
    Block::Callout {
        emoji: score.indicator.emoji().into(),
        text: RichText::plain(format!(
            "Quality: {}/100 ({}) · Relevance {}/40 · Completeness {}/30 · Actionability {}/30",
            score.overall,
            score.indicator.as_str(),
            score.relevance,
            score.completeness,
            score.actionability
        )),
        children: Vec::new(),
    }
}

fn classification_section(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Option<Block> {
    let mut children = Vec::new();

    if let Some(c) = classification_of(results) {
        children.push(field_line("Content type", &c.content_type));
        children.push(field_line(
            "Confidence",
            &format!("{:.0}%", c.confidence * 100.0),
        ));
        if !c.ai_primitives.is_empty() {
            children.push(field_line("AI primitives", &c.ai_primitives.join(", ")));
        }
        if let Some(vendor) = &c.vendor {
            children.push(field_line("Vendor", vendor));
        }
        if !c.reasoning.is_empty() {
            children.push(Block::Quote(RichText::plain(clamp(&c.reasoning))));
        }
    }

    if let Some(AnalyzerPayload::Tags { topical, domain }) =
        results.get(&AnalyzerKind::Tagger).map(|r| &r.payload)
    {
        if !topical.is_empty() {
            children.push(field_line("Topical tags", &topical.join(", ")));
        }
        if !domain.is_empty() {
            children.push(field_line("Domain tags", &domain.join(", ")));
        }
    }
    if let Some(AnalyzerPayload::ContentTags(tags)) =
        results.get(&AnalyzerKind::ContentTagger).map(|r| &r.payload)
    {
        if !tags.is_empty() {
            children.push(field_line("Content tags", &tags.join(", ")));
        }
    }

    if children.is_empty() {
        return None;
    }
    Some(Block::Toggle {
        title: RichText::plain("🏷️ Classification & Tags"),
        children,
    })
}

/// One row per analyzer invocation: prompt name (deep-linked for remote
/// prompts), version, subscore, timing, and whether web search ran.
fn attribution_section(input: &PageRender<'_>) -> Block {
    let mut children = Vec::new();

    if let Some(avg) = input.analyzer_quality {
        children.push(Block::Paragraph(RichText::plain(format!(
            "{} Analyzer quality: {avg}/100",
            QualityIndicator::from_score(avg).emoji()
        ))));
    }

    for record in input.attributions {
        let mut spans = vec![Span::plain(format!("{}: ", record.analyzer))];
        match record.prompt_url() {
            Some(url) => spans.push(Span::link(record.prompt_name.clone(), url)),
            None => spans.push(Span::plain(record.prompt_name.clone())),
        }
        let details = match (&record.error_kind, record.quality_subscore) {
            (Some(kind), _) => format!(
                " v{} — failed ({kind}) · {} ms",
                record.prompt_version, record.duration_ms
            ),
            (None, Some(subscore)) => format!(
                " v{} — {subscore}/100 · {} ms · {} tok · search {}",
                record.prompt_version,
                record.duration_ms,
                record.token_count,
                if record.web_search_used { "yes" } else { "no" }
            ),
            (None, None) => format!(
                " v{} — {} ms · {} tok",
                record.prompt_version, record.duration_ms, record.token_count
            ),
        };
        spans.push(Span::plain(details));
        children.push(Block::Bullet(RichText(spans)));
    }

    Block::Toggle {
        title: RichText::plain("🔍 Attribution"),
        children,
    }
}

fn field_line(label: &str, value: &str) -> Block {
    Block::Paragraph(RichText(vec![
        Span {
            text: format!("{label}: "),
            bold: true,
            italic: false,
            code: false,
            href: None,
        },
        Span::plain(clamp(value)),
    ]))
}

/// Clamps a single-leaf text to the store limit; section content built
/// from markdown is split properly instead.
fn clamp(text: &str) -> String {
    if text.chars().count() <= blocks::MAX_TEXT_BLOCK_CHARS {
        return text.to_string();
    }
    let mut cut: String = text
        .chars()
        .take(blocks::MAX_TEXT_BLOCK_CHARS - 1)
        .collect();
    cut.push('…');
    cut
}

fn summary_of(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Option<String> {
    match results.get(&AnalyzerKind::Summarizer).map(|r| &r.payload) {
        Some(AnalyzerPayload::Summary(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn insights_of(results: &BTreeMap<AnalyzerKind, AnalyzerResult>) -> Option<&Vec<String>> {
    match results.get(&AnalyzerKind::Insights).map(|r| &r.payload) {
        Some(AnalyzerPayload::Insights(items)) if !items.is_empty() => Some(items),
        _ => None,
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
