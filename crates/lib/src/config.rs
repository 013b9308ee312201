//! # Pipeline Configuration
//!
//! All runtime configuration comes from environment variables (loaded from
//! `.env` by the binary via `dotenvy` before this module runs). Unknown
//! variables are ignored; missing credentials fail fast with a
//! [`ConfigError`] so the process can exit with code 1.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::analyzers::AnalyzerKind;
use crate::errors::ConfigError;

/// Default Notion API version header, overridable via `NOTION_VERSION`.
const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Minimum delay between destination-store requests, in seconds.
const DEFAULT_RATE_LIMIT_DELAY: f64 = 0.334;

/// Delay between successful provider requests within a run.
const DEFAULT_PROVIDER_DELAY_MS: u64 = 200;

fn default_content_taxonomy() -> Vec<String> {
    [
        "Market News",
        "Research Paper",
        "Vendor Announcement",
        "Thought Leadership",
        "Case Study",
        "Technical Tutorial",
        "Email",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_known_vendors() -> Vec<String> {
    [
        "OpenAI", "Anthropic", "Google", "Microsoft", "Meta", "Amazon", "Nvidia", "Mistral",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Credentials and endpoints.
    pub notion_token: String,
    pub notion_version: String,
    pub sources_db_id: String,
    pub prompts_db_id: Option<String>,
    pub ai_api_key: String,
    pub local_ai_api_url: Option<String>,

    // Model routing: small/cheap models for classification and tagging,
    // larger ones for prose generation. Names are opaque strings.
    pub model_classifier: String,
    pub model_summary: String,
    pub model_insights: String,

    // Feature toggles.
    pub enhanced_formatting: bool,
    pub enable_web_search: bool,
    pub analyzer_web_search: HashMap<AnalyzerKind, bool>,
    pub deeplink_dedup: bool,

    // Limits and pacing.
    pub rate_limit_delay: Duration,
    pub provider_delay: Duration,
    pub max_blocks: usize,
    pub min_quality_score: u8,
    pub analyzer_pool: usize,
    /// Documents in flight at once. 1 keeps runs sequential; higher values
    /// multiply destination-store rate-limit pressure.
    pub document_parallelism: usize,
    pub provider_timeout: Duration,
    pub store_timeout: Duration,
    pub document_timeout: Duration,

    // Classifier taxonomy.
    pub content_taxonomy: Vec<String>,
    pub known_vendors: Vec<String>,
    pub fallback_content_type: String,

    // Local resources.
    pub local_prompts_path: Option<PathBuf>,
    pub download_dir: PathBuf,

    // Run modes, set by the CLI rather than the environment.
    pub dry_run: bool,
    pub skip_enrichment: bool,
}

impl PipelineConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let notion_token = require("NOTION_TOKEN")?;
        let sources_db_id = require("NOTION_SOURCES_DB")?;
        let ai_api_key = require("AI_API_KEY")?;

        let mut analyzer_web_search = HashMap::new();
        for kind in AnalyzerKind::all() {
            let var = format!("{}_WEB_SEARCH", kind.as_str().to_uppercase().replace('-', "_"));
            analyzer_web_search.insert(*kind, env_bool(&var, true)?);
        }

        let content_taxonomy = env_list("CONTENT_TYPES").unwrap_or_else(default_content_taxonomy);
        let fallback_content_type = content_taxonomy
            .iter()
            .find(|t| t.eq_ignore_ascii_case("other"))
            .cloned()
            .unwrap_or_else(|| content_taxonomy.last().cloned().unwrap_or_default());

        Ok(Self {
            notion_token,
            notion_version: env::var("NOTION_VERSION")
                .unwrap_or_else(|_| DEFAULT_NOTION_VERSION.to_string()),
            sources_db_id,
            prompts_db_id: env::var("NOTION_PROMPTS_DB").ok(),
            ai_api_key,
            local_ai_api_url: env::var("LOCAL_AI_API_URL").ok(),
            model_classifier: env::var("MODEL_CLASSIFIER")
                .unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string()),
            model_summary: env::var("MODEL_SUMMARY")
                .unwrap_or_else(|_| "gemini-2.5-pro".to_string()),
            model_insights: env::var("MODEL_INSIGHTS")
                .unwrap_or_else(|_| "gemini-2.5-pro".to_string()),
            enhanced_formatting: env_bool("USE_ENHANCED_FORMATTING", true)?,
            enable_web_search: env_bool("ENABLE_WEB_SEARCH", true)?,
            analyzer_web_search,
            deeplink_dedup: env_bool("USE_DEEPLINK_DEDUP", false)?,
            rate_limit_delay: Duration::from_secs_f64(env_f64(
                "RATE_LIMIT_DELAY",
                DEFAULT_RATE_LIMIT_DELAY,
            )?),
            provider_delay: Duration::from_millis(DEFAULT_PROVIDER_DELAY_MS),
            max_blocks: env_usize("MAX_NOTION_BLOCKS", 15)?,
            min_quality_score: env_usize("MIN_QUALITY_SCORE", 50)? as u8,
            analyzer_pool: env_usize("ANALYZER_POOL", 5)?,
            document_parallelism: env_usize("DOCUMENT_PARALLELISM", 1)?,
            provider_timeout: Duration::from_secs(env_usize("PROVIDER_TIMEOUT_SECS", 300)? as u64),
            store_timeout: Duration::from_secs(env_usize("STORE_TIMEOUT_SECS", 30)? as u64),
            document_timeout: Duration::from_secs(env_usize("DOCUMENT_TIMEOUT_SECS", 1200)? as u64),
            content_taxonomy,
            known_vendors: env_list("KNOWN_VENDORS").unwrap_or_else(default_known_vendors),
            fallback_content_type,
            local_prompts_path: env::var("PROMPTS_FILE").ok().map(PathBuf::from),
            download_dir: env::var("LOCAL_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("downloads")),
            dry_run: false,
            skip_enrichment: false,
        })
    }

    /// The fingerprint derivation the acquisition stage must use this run.
    pub fn fingerprint_mode(&self) -> crate::ingest::FingerprintMode {
        if self.deeplink_dedup {
            crate::ingest::FingerprintMode::DeepLink
        } else {
            crate::ingest::FingerprintMode::ContentHash
        }
    }

    /// Effective web-search flag for one analyzer: the per-analyzer override
    /// is ANDed with the master switch.
    pub fn web_search_for(&self, kind: AnalyzerKind) -> bool {
        self.enable_web_search && *self.analyzer_web_search.get(&kind).unwrap_or(&true)
    }

    /// The model routed to an analyzer kind.
    pub fn model_for(&self, kind: AnalyzerKind) -> &str {
        match kind {
            AnalyzerKind::Summarizer => &self.model_summary,
            AnalyzerKind::Insights | AnalyzerKind::Technical | AnalyzerKind::Market => {
                &self.model_insights
            }
            _ => &self.model_classifier,
        }
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name.to_string())),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidVar {
                name: name.to_string(),
                reason: format!("expected a boolean, got '{raw}'"),
            }),
        },
    }
}

fn env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
            name: name.to_string(),
            reason: format!("expected a number, got '{raw}'"),
        }),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
            name: name.to_string(),
            reason: format!("expected an integer, got '{raw}'"),
        }),
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
