//! # Prompt Templates
//!
//! Every analyzer call is driven by a [`PromptTemplate`]: system text, a
//! user template with a small enumerated placeholder set, and the knobs the
//! LM client needs (temperature, web-search flag, model-independent
//! metadata). Templates come from the remote prompt database or from local
//! defaults; [`defaults`] holds the built-in last-resort set.

pub mod defaults;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::PromptStoreError;

/// Where a template was loaded from; carried into attribution so analytics
/// can tell remote-managed prompts from shipped defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Remote,
    Local,
}

impl TemplateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateSource::Remote => "remote",
            TemplateSource::Local => "local",
        }
    }
}

/// A fully resolved prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Opaque identifier from the template's source (a page id for remote
    /// templates, a stable slug for local ones).
    pub id: String,
    pub name: String,
    pub system_text: String,
    pub user_template: String,
    pub temperature: f32,
    pub web_search_enabled: bool,
    /// Minimum subscore this prompt's outputs are expected to reach.
    pub quality_threshold: Option<u8>,
    pub version: u32,
    pub source: TemplateSource,
}

/// The only substitution variables a user template may reference. Unknown
/// placeholders are rejected at load time, not at render time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub content_type: &'a str,
    pub hints: &'a str,
}

const ALLOWED_PLACEHOLDERS: &[&str] = &["title", "content", "content_type", "hints"];

fn placeholder_pattern() -> Regex {
    Regex::new(r"\{([a-z_]+)\}").unwrap()
}

/// Rejects templates that reference placeholders outside the enumerated
/// set. Run once when a template enters the cache.
pub fn validate_placeholders(name: &str, template: &str) -> Result<(), PromptStoreError> {
    for capture in placeholder_pattern().captures_iter(template) {
        let found = &capture[1];
        if !ALLOWED_PLACEHOLDERS.contains(&found) {
            return Err(PromptStoreError::UnknownPlaceholder {
                name: name.to_string(),
                placeholder: found.to_string(),
            });
        }
    }
    Ok(())
}

/// Substitutes the variable set into a validated template.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    template
        .replace("{title}", vars.title)
        .replace("{content}", vars.content)
        .replace("{content_type}", vars.content_type)
        .replace("{hints}", vars.hints)
}
