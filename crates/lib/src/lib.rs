//! # paperbase
//!
//! Batch content-enrichment pipeline: ingests PDF documents, deduplicates
//! them by content fingerprint, extracts text, runs a staged set of LLM
//! analyzers (classification, summary, insights, tagging), scores the
//! result, and writes a formatted page into a Notion database with full
//! prompt attribution.

pub mod analyzers;
pub mod attribution;
pub mod config;
pub mod errors;
pub mod extract;
pub mod format;
pub mod ingest;
pub mod notestore;
pub mod pipeline;
pub mod prompt_store;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod scoring;

pub use config::PipelineConfig;
pub use errors::{ConfigError, LmError, PipelineError, PromptStoreError, StoreError};
pub use pipeline::{CancellationFlag, DocumentOutcome, Pipeline, RunStats};
