//! Built-in default templates, one per analyzer kind. These are the last
//! rung of the fallback ladder: remote prompt → legacy remote key → local
//! prompt file → this module. Keep them generic enough to work for any
//! content type.

use super::{PromptTemplate, TemplateSource};
use crate::analyzers::AnalyzerKind;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a strict document classifier for a personal research library.
You must answer with a single JSON object and nothing else, using this shape:
{"content_type": "...", "ai_primitives": ["..."], "vendor": "...", "confidence": 0.0, "reasoning": "..."}
Rules:
- content_type MUST be exactly one entry from the provided list. If unsure, pick the safest generic entry.
- ai_primitives: zero to three short phrases naming AI techniques the document concerns.
- vendor: a company from the provided vendor list when one is clearly central, otherwise null.
- confidence: your certainty in [0,1]."#;

pub const CLASSIFIER_USER_PROMPT: &str = r#"Classify this document.

Title: {title}

{hints}

Document content:
{content}"#;

pub const SUMMARIZER_SYSTEM_PROMPT: &str = r#"You are a precise technical summarizer. Produce a markdown summary with these constraints:
- At most 400 words.
- Use only ## and ### headings.
- Prefer short bulleted lists over paragraphs.
- Never include raw URLs; name the source instead.
- Lead with the single most important takeaway."#;

pub const SUMMARIZER_USER_PROMPT: &str = r#"Summarize the following {content_type} document titled "{title}".

{content}"#;

pub const INSIGHTS_SYSTEM_PROMPT: &str = r#"You extract strategic insights an expert reader would not find obvious.
Respond with a markdown bulleted list only. Each bullet is one distinct observation of at most two sentences.
Do not restate the document's summary; surface implications, contradictions, and second-order effects."#;

pub const INSIGHTS_USER_PROMPT: &str = r#"List the non-obvious insights from this {content_type} document titled "{title}".

{hints}

{content}"#;

pub const TAGGER_SYSTEM_PROMPT: &str = r#"You assign library tags. Respond with a single JSON object and nothing else:
{"topical_tags": ["..."], "domain_tags": ["..."]}
topical_tags name the subjects discussed (2-4 entries); domain_tags name the industry or field (1-3 entries).
The two lists must not share entries. Draw tags from the document itself."#;

pub const TAGGER_USER_PROMPT: &str = r#"Tag this {content_type} document titled "{title}".

{content}"#;

pub const CONTENT_TAGGER_SYSTEM_PROMPT: &str = r#"You produce retrieval tags for a note database. Respond with a single JSON object and nothing else:
{"tags": ["..."]}
Rules:
- One to seven tags, ordered from most to least relevant.
- Each tag is at most four words and fifty characters, in Title Case.
- No duplicates, no generic filler like "Document" or "Information"."#;

pub const CONTENT_TAGGER_USER_PROMPT: &str = r#"Generate content tags for this {content_type} document titled "{title}".

{content}"#;

pub const TECHNICAL_SYSTEM_PROMPT: &str = r#"You are a technology analyst. Respond with a markdown bulleted list of the concrete technical claims in the document: architectures, benchmarks, protocols, and limitations. At most two sentences per bullet."#;

pub const MARKET_SYSTEM_PROMPT: &str = r#"You are a market analyst. Respond with a markdown bulleted list covering competitive positioning, pricing signals, and market-size claims made in the document. At most two sentences per bullet."#;

pub const ANALYSIS_USER_PROMPT: &str = r#"Analyze this {content_type} document titled "{title}".

{content}"#;

/// The built-in template for an analyzer kind.
pub fn builtin(kind: AnalyzerKind) -> PromptTemplate {
    let (system, user, temperature, web_search) = match kind {
        AnalyzerKind::Classifier => (CLASSIFIER_SYSTEM_PROMPT, CLASSIFIER_USER_PROMPT, 0.0, false),
        AnalyzerKind::Summarizer => (SUMMARIZER_SYSTEM_PROMPT, SUMMARIZER_USER_PROMPT, 0.2, false),
        AnalyzerKind::Insights => (INSIGHTS_SYSTEM_PROMPT, INSIGHTS_USER_PROMPT, 0.3, true),
        AnalyzerKind::Tagger => (TAGGER_SYSTEM_PROMPT, TAGGER_USER_PROMPT, 0.0, false),
        AnalyzerKind::ContentTagger => (
            CONTENT_TAGGER_SYSTEM_PROMPT,
            CONTENT_TAGGER_USER_PROMPT,
            0.0,
            false,
        ),
        AnalyzerKind::Technical => (TECHNICAL_SYSTEM_PROMPT, ANALYSIS_USER_PROMPT, 0.2, true),
        AnalyzerKind::Market => (MARKET_SYSTEM_PROMPT, ANALYSIS_USER_PROMPT, 0.2, true),
    };

    PromptTemplate {
        id: format!("builtin/{}", kind.as_str()),
        name: format!("Default {}", kind.as_str()),
        system_text: system.to_string(),
        user_template: user.to_string(),
        temperature,
        web_search_enabled: web_search,
        quality_threshold: None,
        version: 1,
        source: TemplateSource::Local,
    }
}
