//! # Prompt Store
//!
//! Serves the best template for a `(content_type, analyzer)` pair. The
//! cache is populated from the remote prompt database at startup (and on
//! explicit refresh) and backed by a local YAML file plus built-in
//! defaults, so `get` always returns something.
//!
//! Cache key rule, applied identically on the write and read sides:
//! `lower(content_type).replace(' ', '_') + "_" + lower(analyzer)`. Rows
//! written before normalization existed are reachable through a legacy-key
//! probe so old prompt databases keep working.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::analyzers::AnalyzerKind;
use crate::errors::{PromptStoreError, StoreError};
use crate::prompts::{defaults, validate_placeholders, PromptTemplate, TemplateSource};

/// The normalized cache key for a content type and analyzer.
pub fn cache_key(content_type: &str, analyzer: AnalyzerKind) -> String {
    format!(
        "{}_{}",
        content_type.to_lowercase().replace(' ', "_"),
        analyzer.as_str().to_lowercase()
    )
}

/// One row fetched from the remote prompt database.
#[derive(Debug, Clone)]
pub struct RemotePromptRow {
    pub content_type: String,
    pub analyzer: String,
    /// The verbatim key the row was registered under, for rows created
    /// before key normalization. `None` for well-formed rows.
    pub legacy_key: Option<String>,
    pub template: PromptTemplate,
}

/// Fetches all prompt rows from the remote store.
#[async_trait]
pub trait RemotePromptSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<RemotePromptRow>, StoreError>;
}

/// Schema of the local YAML prompt file.
#[derive(Debug, Deserialize)]
struct LocalPromptEntry {
    content_type: String,
    analyzer: String,
    #[serde(default)]
    name: Option<String>,
    system: String,
    user: String,
    #[serde(default)]
    temperature: f32,
    #[serde(default)]
    web_search: bool,
    #[serde(default)]
    quality_threshold: Option<u8>,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    1
}

pub struct PromptStore {
    remote: Option<Box<dyn RemotePromptSource>>,
    /// Remote templates under normalized keys.
    cache: RwLock<HashMap<String, PromptTemplate>>,
    /// Remote templates reachable only through their raw legacy key.
    legacy: RwLock<HashMap<String, PromptTemplate>>,
    /// Local-file templates under normalized keys. Read-only after load.
    local: HashMap<String, PromptTemplate>,
    last_refresh: RwLock<Option<Instant>>,
}

impl PromptStore {
    /// A store with no remote source and no local file; `get` serves
    /// built-in defaults only.
    pub fn builtin_only() -> Self {
        Self {
            remote: None,
            cache: RwLock::new(HashMap::new()),
            legacy: RwLock::new(HashMap::new()),
            local: HashMap::new(),
            last_refresh: RwLock::new(None),
        }
    }

    pub fn with_remote(mut self, remote: Box<dyn RemotePromptSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Loads the local YAML prompt file. Unknown placeholders in any entry
    /// fail the load; a bad local file is a configuration problem.
    pub fn with_local_file(mut self, path: &Path) -> Result<Self, PromptStoreError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<LocalPromptEntry> = serde_yaml::from_str(&raw)?;
        for entry in entries {
            let name = entry
                .name
                .clone()
                .unwrap_or_else(|| format!("{} {}", entry.content_type, entry.analyzer));
            validate_placeholders(&name, &entry.user)?;
            let key = format!(
                "{}_{}",
                entry.content_type.to_lowercase().replace(' ', "_"),
                entry.analyzer.to_lowercase()
            );
            let template = PromptTemplate {
                id: format!("local/{key}"),
                name,
                system_text: entry.system,
                user_template: entry.user,
                temperature: entry.temperature,
                web_search_enabled: entry.web_search,
                quality_threshold: entry.quality_threshold,
                version: entry.version,
                source: TemplateSource::Local,
            };
            self.local.insert(key, template);
        }
        info!(count = self.local.len(), "loaded local prompt file");
        Ok(self)
    }

    /// Reloads every remote prompt into the cache. Rows with invalid
    /// placeholders are skipped with a warning rather than failing the
    /// whole refresh; when several rows share a normalized key the highest
    /// version wins.
    pub async fn refresh(&self) -> Result<usize, PromptStoreError> {
        let Some(remote) = &self.remote else {
            return Ok(0);
        };

        let rows = remote.fetch_all().await?;
        let mut cache: HashMap<String, PromptTemplate> = HashMap::new();
        let mut legacy: HashMap<String, PromptTemplate> = HashMap::new();

        for row in rows {
            if let Err(e) = validate_placeholders(&row.template.name, &row.template.user_template)
            {
                warn!("skipping remote prompt: {e}");
                continue;
            }
            match &row.legacy_key {
                Some(raw_key) => {
                    legacy.insert(raw_key.clone(), row.template);
                }
                None => {
                    let key = format!(
                        "{}_{}",
                        row.content_type.to_lowercase().replace(' ', "_"),
                        row.analyzer.to_lowercase()
                    );
                    match cache.get(&key) {
                        Some(existing) if existing.version >= row.template.version => {
                            debug!(
                                key,
                                kept = existing.version,
                                dropped = row.template.version,
                                "duplicate prompt key, keeping higher version"
                            );
                        }
                        _ => {
                            cache.insert(key, row.template);
                        }
                    }
                }
            }
        }

        let count = cache.len() + legacy.len();
        info!(
            normalized = cache.len(),
            legacy = legacy.len(),
            "refreshed prompt cache"
        );
        *self.cache.write().unwrap() = cache;
        *self.legacy.write().unwrap() = legacy;
        *self.last_refresh.write().unwrap() = Some(Instant::now());
        Ok(count)
    }

    /// Refreshes only when the cache is older than `ttl`.
    pub async fn refresh_if_stale(&self, ttl: Duration) -> Result<(), PromptStoreError> {
        let stale = self
            .last_refresh
            .read()
            .unwrap()
            .map(|at| at.elapsed() >= ttl)
            .unwrap_or(true);
        if stale {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Resolves the best template for the pair. Never fails; the fallback
    /// order is normalized remote key, legacy remote key, local file entry
    /// for the content type, local default entry, built-in default.
    pub fn get(&self, content_type: &str, kind: AnalyzerKind) -> PromptTemplate {
        let key = cache_key(content_type, kind);

        if let Some(template) = self.cache.read().unwrap().get(&key) {
            debug!(key, source = "remote", "prompt cache hit");
            return template.clone();
        }

        // Compatibility probe: older rows were registered before spaces
        // were normalized, under keys like "market news_summarizer".
        let analyzer = kind.as_str().to_lowercase();
        let probes = [
            format!("{}_{analyzer}", content_type.to_lowercase()),
            format!("{content_type}_{analyzer}"),
        ];
        {
            let legacy = self.legacy.read().unwrap();
            for probe in &probes {
                if let Some(template) = legacy.get(probe) {
                    debug!(
                        normalized_key = key,
                        legacy_key = probe.as_str(),
                        "prompt cache miss on normalized key, legacy key hit"
                    );
                    return template.clone();
                }
            }
        }

        if let Some(template) = self.local.get(&key) {
            debug!(key, source = "local", "prompt resolved from local file");
            return template.clone();
        }

        let default_key = cache_key("default", kind);
        if let Some(template) = self.local.get(&default_key) {
            debug!(
                key,
                fallback_key = default_key,
                "prompt resolved from local default"
            );
            return template.clone();
        }

        debug!(key, "prompt resolved from built-in default");
        defaults::builtin(kind)
    }
}
