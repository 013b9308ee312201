//! # Pipeline Processor
//!
//! Drives each source document through the per-document state machine:
//!
//! ```text
//! NEW → CHECK_DUP → { DUPLICATE | EXTRACT }
//! EXTRACT → ANALYZE (classifier first, the rest concurrently)
//! ANALYZE → SCORE → FORMAT → WRITE → { ENRICHED | FAILED }
//! ```
//!
//! Documents are processed sequentially; within a document the
//! post-classifier analyzers run in a bounded pool and their results are
//! joined by kind, so output ordering never depends on completion order. A
//! single failing analyzer degrades the page; a failing write leaves the
//! document unrecorded so the next run retries it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::analyzers::{
    Analyzer, AnalyzerInput, AnalyzerKind, AnalyzerPayload, AnalyzerResult, ClassifierAnalyzer,
    ContentTaggerAnalyzer, InsightsAnalyzer, SummarizerAnalyzer, TaggerAnalyzer,
};
use crate::attribution::AttributionTracker;
use crate::config::PipelineConfig;
use crate::errors::{PipelineError, StoreError};
use crate::extract::{ExtractedText, ExtractorChain};
use crate::format::{build_page_blocks, FormatOptions, PageRender};
use crate::ingest::SourceDocument;
use crate::notestore::{NoteStore, PageProperties, PageStatus};
use crate::prompt_store::PromptStore;
use crate::providers::ai::LmClient;
use crate::scoring::{analyzer_quality, score_document, QualityScore};

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub scanned: usize,
    pub skipped_duplicate: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Pages created as Inbox in skip-enrichment mode.
    pub inbox_created: usize,
    /// Documents never attempted because the run was cancelled.
    pub not_attempted: usize,
}

/// Cooperative cancellation, observed between documents and between
/// analyzer stages. In-flight provider calls run to completion so every
/// attribution record keeps its counterpart write.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Duplicate,
    Enriched { page_id: String },
    FailedPage { page_id: String },
    InboxCreated { page_id: String },
    /// Dry run: actions were planned and logged, nothing written.
    Planned,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn NoteStore>,
    tracker: Arc<AttributionTracker>,
    extractors: ExtractorChain,
    classifier: Arc<dyn Analyzer>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    cancel: CancellationFlag,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn NoteStore>,
        prompts: Arc<PromptStore>,
        lm: Arc<LmClient>,
        tracker: Arc<AttributionTracker>,
        cancel: CancellationFlag,
    ) -> Self {
        let classifier: Arc<dyn Analyzer> =
            Arc::new(ClassifierAnalyzer::new(prompts.clone(), lm.clone(), &config));
        let analyzers: Vec<Arc<dyn Analyzer>> = vec![
            Arc::new(SummarizerAnalyzer::new(prompts.clone(), lm.clone(), &config)),
            Arc::new(InsightsAnalyzer::new(prompts.clone(), lm.clone(), &config)),
            Arc::new(ContentTaggerAnalyzer::new(
                prompts.clone(),
                lm.clone(),
                &config,
            )),
            Arc::new(TaggerAnalyzer::new(prompts, lm, &config)),
        ];
        Self {
            config,
            store,
            tracker,
            extractors: ExtractorChain::standard(),
            classifier,
            analyzers,
            cancel,
        }
    }

    pub fn tracker(&self) -> &Arc<AttributionTracker> {
        &self.tracker
    }

    /// Processes every document. Sequential by default; with
    /// `document_parallelism > 1` up to N documents are in flight at once,
    /// with the store client's serializer guarding rate-limit pressure.
    /// Never aborts on a single document; counters accumulate and are
    /// reported at the end.
    pub async fn run(&self, documents: Vec<SourceDocument>) -> RunStats {
        let mut stats = RunStats::default();
        let parallelism = self.config.document_parallelism.max(1);

        let outcomes: Vec<Option<Result<DocumentOutcome, PipelineError>>> =
            stream::iter(documents.iter())
                .map(|document| async move {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    info!(
                        event_type = "ingest_start",
                        document_fingerprint = %document.fingerprint,
                        title = %document.display_name,
                        origin = document.origin.as_str(),
                    );
                    let outcome = tokio::time::timeout(
                        self.config.document_timeout,
                        self.process_document(document),
                    )
                    .await
                    .unwrap_or(Err(PipelineError::DocumentTimeout(
                        self.config.document_timeout,
                    )));
                    if let Err(e) = &outcome {
                        error!(
                            event_type = "write_failed",
                            document_fingerprint = %document.fingerprint,
                            error_kind = e.kind(),
                            "document processing failed: {e}"
                        );
                    }
                    Some(outcome)
                })
                .buffered(parallelism)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome {
                None => stats.not_attempted += 1,
                Some(Ok(DocumentOutcome::Duplicate)) => {
                    stats.scanned += 1;
                    stats.skipped_duplicate += 1;
                }
                Some(Ok(DocumentOutcome::Enriched { .. })) => {
                    stats.scanned += 1;
                    stats.enriched += 1;
                }
                Some(Ok(DocumentOutcome::FailedPage { .. })) => {
                    stats.scanned += 1;
                    stats.failed += 1;
                }
                Some(Ok(DocumentOutcome::InboxCreated { .. })) => {
                    stats.scanned += 1;
                    stats.inbox_created += 1;
                }
                Some(Ok(DocumentOutcome::Planned)) => stats.scanned += 1,
                Some(Err(_)) => {
                    stats.scanned += 1;
                    stats.failed += 1;
                }
            }
        }
        if stats.not_attempted > 0 {
            warn!(not_attempted = stats.not_attempted, "run cancelled");
        }

        info!(
            event_type = "run_summary",
            scanned = stats.scanned,
            skipped_duplicate = stats.skipped_duplicate,
            enriched = stats.enriched,
            failed = stats.failed,
            inbox_created = stats.inbox_created,
            not_attempted = stats.not_attempted,
        );
        stats
    }

    async fn process_document(
        &self,
        document: &SourceDocument,
    ) -> Result<DocumentOutcome, PipelineError> {
        let fingerprint = document.fingerprint.as_str();

        // CHECK_DUP: the store is the authoritative index.
        if let Some(existing) = self
            .store
            .find_by_fingerprint(fingerprint)
            .await
            .map_err(PipelineError::Dedup)?
        {
            info!(
                event_type = "dedup_hit",
                document_fingerprint = %fingerprint,
                page_id = %existing.page_id,
            );
            return Ok(DocumentOutcome::Duplicate);
        }

        if self.config.dry_run {
            info!(
                document_fingerprint = %fingerprint,
                title = %document.display_name,
                "dry run: would extract, analyze, and create a page"
            );
            return Ok(DocumentOutcome::Planned);
        }

        if self.config.skip_enrichment {
            let properties = PageProperties::inbox(
                &document.display_name,
                fingerprint,
                document.origin.drive_url(),
            );
            let page_id = self.write_page(fingerprint, &properties, &[]).await?;
            return Ok(DocumentOutcome::InboxCreated { page_id });
        }

        // EXTRACT: empty output is degraded, not fatal.
        let bytes = document.raw_bytes.clone().unwrap_or_default();
        let extracted = self.extractors.extract(bytes).await;
        info!(
            event_type = "extract_result",
            document_fingerprint = %fingerprint,
            extractor = %extracted.extractor_used,
            chars = extracted.text.len(),
        );

        // ANALYZE: classifier first, the rest joined by kind.
        let results = self.analyze(document, &extracted).await;

        // SCORE.
        let score = score_document(&results, &extracted);
        if score.overall < self.config.min_quality_score {
            warn!(
                document_fingerprint = %fingerprint,
                quality_score = score.overall,
                threshold = self.config.min_quality_score,
                "page quality below threshold; flagged, not rejected"
            );
        }

        // FORMAT.
        let all_failed = results.values().all(|r| r.payload.is_failed());
        let status = if extracted.is_empty() || all_failed {
            PageStatus::Failed
        } else {
            PageStatus::Enriched
        };
        let properties = self.page_properties(document, &results, score, status);
        let attributions = self.tracker.records_for(fingerprint);
        let render = PageRender {
            title: &document.display_name,
            origin: document.origin.as_str(),
            drive_url: document.origin.drive_url(),
            extracted: &extracted,
            results: &results,
            score,
            analyzer_quality: analyzer_quality(&results),
            attributions: &attributions,
        };
        let options = FormatOptions {
            max_blocks: self.config.max_blocks,
            enhanced: self.config.enhanced_formatting,
        };
        let blocks = build_page_blocks(&render, &options);

        // WRITE.
        let page_id = self.write_page(fingerprint, &properties, &blocks).await?;
        match status {
            PageStatus::Failed => Ok(DocumentOutcome::FailedPage { page_id }),
            _ => Ok(DocumentOutcome::Enriched { page_id }),
        }
    }

    /// Runs the classifier, then the remaining analyzers in a bounded pool.
    /// Results are keyed by analyzer kind; a cancelled run skips the
    /// post-classifier batch.
    async fn analyze(
        &self,
        document: &SourceDocument,
        extracted: &ExtractedText,
    ) -> BTreeMap<AnalyzerKind, AnalyzerResult> {
        let fingerprint = document.fingerprint.as_str();
        let text = extracted.analyzer_text();
        let mut results = BTreeMap::new();

        let classifier_input = AnalyzerInput {
            text,
            title: &document.display_name,
            content_type_hint: None,
        };
        let classification = self
            .run_analyzer(&self.classifier, classifier_input, fingerprint)
            .await;
        let content_type = match &classification.payload {
            AnalyzerPayload::Classification(c) => c.content_type.clone(),
            _ => self.config.fallback_content_type.clone(),
        };
        results.insert(classification.kind, classification);

        if self.cancel.is_cancelled() {
            warn!(
                document_fingerprint = %fingerprint,
                "cancellation observed, skipping remaining analyzers"
            );
            return results;
        }

        let input = AnalyzerInput {
            text,
            title: &document.display_name,
            content_type_hint: Some(&content_type),
        };
        let remaining: Vec<AnalyzerResult> = stream::iter(self.analyzers.iter())
            .map(|analyzer| self.run_analyzer(analyzer, input, fingerprint))
            .buffer_unordered(self.config.analyzer_pool)
            .collect()
            .await;

        for result in remaining {
            results.insert(result.kind, result);
        }
        results
    }

    async fn run_analyzer(
        &self,
        analyzer: &Arc<dyn Analyzer>,
        input: AnalyzerInput<'_>,
        fingerprint: &str,
    ) -> AnalyzerResult {
        info!(
            event_type = "analyzer_start",
            document_fingerprint = %fingerprint,
            analyzer = %analyzer.kind(),
        );
        let result = analyzer.analyze(input).await;
        let record = self.tracker.record(fingerprint, &result);
        info!(
            event_type = "analyzer_end",
            document_fingerprint = %fingerprint,
            analyzer = %result.kind,
            execution_id = %record.execution_id,
            duration_ms = record.duration_ms,
            error_kind = record.error_kind.as_deref().unwrap_or(""),
        );
        result
    }

    /// WRITE with the duplicate-race fallback: a conflict means another
    /// writer created the page since our dedup check, so update instead.
    async fn write_page(
        &self,
        fingerprint: &str,
        properties: &PageProperties,
        blocks: &[crate::format::Block],
    ) -> Result<String, PipelineError> {
        match self.store.create_page(properties, blocks).await {
            Ok(page_id) => {
                info!(
                    event_type = "write_ok",
                    document_fingerprint = %fingerprint,
                    page_id = %page_id,
                );
                Ok(page_id)
            }
            Err(StoreError::Conflict(message)) => {
                warn!(
                    document_fingerprint = %fingerprint,
                    "create raced an existing page ({message}); updating instead"
                );
                let existing = self
                    .store
                    .find_by_fingerprint(fingerprint)
                    .await
                    .map_err(PipelineError::Write)?
                    .ok_or(PipelineError::Write(StoreError::Conflict(message)))?;
                self.store
                    .update_page(&existing.page_id, properties, Some(blocks))
                    .await
                    .map_err(PipelineError::Write)?;
                info!(
                    event_type = "write_ok",
                    document_fingerprint = %fingerprint,
                    page_id = %existing.page_id,
                );
                Ok(existing.page_id)
            }
            Err(other) => Err(PipelineError::Write(other)),
        }
    }

    fn page_properties(
        &self,
        document: &SourceDocument,
        results: &BTreeMap<AnalyzerKind, AnalyzerResult>,
        score: QualityScore,
        status: PageStatus,
    ) -> PageProperties {
        let classification = match results.get(&AnalyzerKind::Classifier).map(|r| &r.payload) {
            Some(AnalyzerPayload::Classification(c)) => Some(c),
            _ => None,
        };
        let (topical, domain) = match results.get(&AnalyzerKind::Tagger).map(|r| &r.payload) {
            Some(AnalyzerPayload::Tags { topical, domain }) => (topical.clone(), domain.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        let content_tags = match results.get(&AnalyzerKind::ContentTagger).map(|r| &r.payload) {
            Some(AnalyzerPayload::ContentTags(tags)) => tags.clone(),
            _ => Vec::new(),
        };

        PageProperties {
            title: document.display_name.clone(),
            fingerprint: document.fingerprint.clone(),
            status,
            content_type: classification.map(|c| c.content_type.clone()),
            vendor: classification.and_then(|c| c.vendor.clone()),
            ai_primitives: classification
                .map(|c| c.ai_primitives.clone())
                .unwrap_or_default(),
            topical_tags: topical,
            domain_tags: domain,
            content_tags,
            quality_score: Some(score.overall),
            drive_url: document.origin.drive_url().map(str::to_string),
            created_date: chrono::Utc::now(),
        }
    }
}
