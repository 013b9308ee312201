//! # Attribution Tracking
//!
//! Every analyzer invocation appends one [`AttributionRecord`], success or
//! failure. Records render into the page's attribution section and can be
//! mirrored to an analytics sink; mirroring is fire-and-forget and never
//! blocks or fails the pipeline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::analyzers::{AnalyzerKind, AnalyzerResult};
use crate::errors::StoreError;
use crate::prompts::TemplateSource;

/// Append-only log entry for one analyzer invocation. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub execution_id: Uuid,
    pub analyzer: AnalyzerKind,
    pub document_fingerprint: String,
    pub prompt_id: String,
    pub prompt_name: String,
    pub prompt_version: u32,
    pub prompt_source: TemplateSource,
    pub model: String,
    pub temperature: f32,
    pub web_search_used: bool,
    pub duration_ms: u64,
    pub token_count: u32,
    pub quality_subscore: Option<u8>,
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AttributionRecord {
    pub fn from_result(fingerprint: &str, result: &AnalyzerResult) -> Self {
        let a = &result.attribution;
        Self {
            execution_id: a.execution_id,
            analyzer: result.kind,
            document_fingerprint: fingerprint.to_string(),
            prompt_id: a.prompt_id.clone(),
            prompt_name: a.prompt_name.clone(),
            prompt_version: a.prompt_version,
            prompt_source: a.prompt_source,
            model: a.model.clone(),
            temperature: a.temperature,
            web_search_used: a.web_search_used,
            duration_ms: a.duration_ms,
            token_count: a.token_count,
            quality_subscore: result.quality_subscore,
            error_kind: a.error_kind.clone(),
            timestamp: a.timestamp,
        }
    }

    /// Deep link to the prompt's definition in the remote prompt store.
    /// Local and built-in prompts have no page to link to.
    pub fn prompt_url(&self) -> Option<String> {
        match self.prompt_source {
            TemplateSource::Remote => Some(format!(
                "https://www.notion.so/{}",
                self.prompt_id.replace('-', "")
            )),
            TemplateSource::Local => None,
        }
    }
}

/// Analytics sink for mirrored records.
#[async_trait]
pub trait AttributionMirror: Send + Sync {
    async fn append(&self, record: &AttributionRecord) -> Result<(), StoreError>;
}

/// Collects records for the run and fans them out to the optional mirror.
#[derive(Default)]
pub struct AttributionTracker {
    records: Mutex<Vec<AttributionRecord>>,
    mirror: Option<Arc<dyn AttributionMirror>>,
}

impl AttributionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mirror(mirror: Arc<dyn AttributionMirror>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            mirror: Some(mirror),
        }
    }

    /// Appends a record. The mirror write happens on a detached task so a
    /// slow or failing sink cannot stall document processing.
    pub fn record(&self, fingerprint: &str, result: &AnalyzerResult) -> AttributionRecord {
        let record = AttributionRecord::from_result(fingerprint, result);
        self.records.lock().unwrap().push(record.clone());

        if let Some(mirror) = self.mirror.clone() {
            let mirrored = record.clone();
            tokio::spawn(async move {
                if let Err(e) = mirror.append(&mirrored).await {
                    warn!(
                        execution_id = %mirrored.execution_id,
                        "attribution mirror append failed: {e}"
                    );
                }
            });
        }
        record
    }

    /// All records captured so far, in append order.
    pub fn records(&self) -> Vec<AttributionRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records for one document, in append order.
    pub fn records_for(&self, fingerprint: &str) -> Vec<AttributionRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.document_fingerprint == fingerprint)
            .cloned()
            .collect()
    }
}
