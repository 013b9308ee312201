//! # Destination Store
//!
//! The pipeline writes enriched pages into a block-structured note store
//! (Notion). [`NoteStore`] is the seam the orchestrator depends on: the
//! HTTP client in [`client`] implements it for the real API, and tests
//! substitute an in-memory store.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::format::blocks::Block;

pub use client::NotionClient;

/// Lifecycle state of a destination page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    Inbox,
    Enriched,
    Failed,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Inbox => "Inbox",
            PageStatus::Enriched => "Enriched",
            PageStatus::Failed => "Failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Inbox" => Some(PageStatus::Inbox),
            "Enriched" => Some(PageStatus::Enriched),
            "Failed" => Some(PageStatus::Failed),
            _ => None,
        }
    }
}

/// The typed property set of a destination page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageProperties {
    pub title: String,
    pub fingerprint: String,
    pub status: PageStatus,
    pub content_type: Option<String>,
    pub vendor: Option<String>,
    pub ai_primitives: Vec<String>,
    pub topical_tags: Vec<String>,
    pub domain_tags: Vec<String>,
    pub content_tags: Vec<String>,
    pub quality_score: Option<u8>,
    pub drive_url: Option<String>,
    pub created_date: DateTime<Utc>,
}

impl PageProperties {
    /// A minimal property set for a page that has only been ingested.
    pub fn inbox(title: &str, fingerprint: &str, drive_url: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            fingerprint: fingerprint.to_string(),
            status: PageStatus::Inbox,
            content_type: None,
            vendor: None,
            ai_primitives: Vec::new(),
            topical_tags: Vec::new(),
            domain_tags: Vec::new(),
            content_tags: Vec::new(),
            quality_score: None,
            drive_url: drive_url.map(str::to_string),
            created_date: Utc::now(),
        }
    }
}

/// A page located in the store.
#[derive(Debug, Clone)]
pub struct PageSummary {
    pub page_id: String,
    pub properties: PageProperties,
    pub created_time: DateTime<Utc>,
}

/// The operations the pipeline needs from the destination store.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// First page whose fingerprint property equals `fingerprint`, or
    /// `None`. With several matches the earliest-created wins.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PageSummary>, StoreError>;

    /// Creates a page, returning its store-assigned id. A duplicate
    /// fingerprint race surfaces as [`StoreError::Conflict`].
    async fn create_page(
        &self,
        properties: &PageProperties,
        blocks: &[Block],
    ) -> Result<String, StoreError>;

    /// Updates a page's properties, optionally replacing its body.
    async fn update_page(
        &self,
        page_id: &str,
        properties: &PageProperties,
        blocks: Option<&[Block]>,
    ) -> Result<(), StoreError>;

    /// Appends blocks to an existing page body.
    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), StoreError>;

    /// Startup check that the target database exposes the required
    /// properties. Stores without introspection may accept silently.
    async fn verify_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
