//! Shared test doubles for the paperbase workspace: a scriptable LM
//! provider and an in-memory note store. Both record their calls so tests
//! can assert on traffic, not just outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperbase::errors::{LmError, StoreError};
use paperbase::format::Block;
use paperbase::notestore::{NoteStore, PageProperties, PageSummary};
use paperbase::prompt_store::{RemotePromptRow, RemotePromptSource};
use paperbase::providers::ai::{Citation, Completion, CompletionRequest, LmProvider};

// --- Mock LM provider ---

/// Scriptable provider. Responses are keyed by a substring of the system
/// prompt, so one mock serves every analyzer in a run.
#[derive(Clone, Debug, Default)]
pub struct MockLmProvider {
    responses: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    /// When set, `complete_with_search` reports the tool unavailable.
    search_unavailable: Arc<Mutex<bool>>,
    /// Errors returned (and consumed) before any response is served.
    scripted_failures: Arc<Mutex<Vec<LmError>>>,
}

impl MockLmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-programs a response for any system prompt containing `key`.
    pub fn add_response(&self, key: &str, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), response.to_string());
    }

    /// Makes the search endpoint report the tool unavailable.
    pub fn disable_search_tool(&self) {
        *self.search_unavailable.lock().unwrap() = true;
    }

    /// Queues an error to be returned before responses resume.
    pub fn push_failure(&self, error: LmError) {
        self.scripted_failures.lock().unwrap().push(error);
    }

    /// All `(system, user)` prompt pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, request: &CompletionRequest<'_>) -> Result<String, LmError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.system.to_string(), request.user.to_string()));

        if let Some(error) = self.scripted_failures.lock().unwrap().pop() {
            return Err(error);
        }

        let responses = self.responses.lock().unwrap();
        for (key, response) in responses.iter() {
            if request.system.contains(key) {
                return Ok(response.clone());
            }
        }
        Err(LmError::InvalidRequest(format!(
            "MockLmProvider: no response programmed for system prompt '{}'",
            request.system.chars().take(80).collect::<String>()
        )))
    }
}

#[async_trait]
impl LmProvider for MockLmProvider {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LmError> {
        let text = self.respond(&request)?;
        Ok(Completion {
            text,
            token_count: 42,
            latency_ms: 5,
            citations: Vec::new(),
            web_search_used: false,
            search_degraded: false,
        })
    }

    async fn complete_with_search(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, LmError> {
        if *self.search_unavailable.lock().unwrap() {
            return Err(LmError::SearchToolUnavailable);
        }
        let text = self.respond(&request)?;
        Ok(Completion {
            text,
            token_count: 64,
            latency_ms: 9,
            citations: vec![Citation {
                title: "Example source".to_string(),
                url: "https://example.com/source".to_string(),
            }],
            web_search_used: true,
            search_degraded: false,
        })
    }
}

// --- Static prompt source ---

/// A remote prompt source serving a fixed row set.
pub struct StaticPromptSource(pub Vec<RemotePromptRow>);

#[async_trait]
impl RemotePromptSource for StaticPromptSource {
    async fn fetch_all(&self) -> Result<Vec<RemotePromptRow>, StoreError> {
        Ok(self.0.clone())
    }
}

// --- In-memory note store ---

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub page_id: String,
    pub properties: PageProperties,
    pub blocks: Vec<Block>,
    pub created_time: DateTime<Utc>,
    /// Simulates a concurrent writer: the page is invisible to
    /// `find_by_fingerprint` until a create has been attempted.
    pub hidden_until_create: bool,
}

/// Call counters for traffic assertions.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCounters {
    pub finds: usize,
    pub creates: usize,
    pub updates: usize,
    pub appends: usize,
}

/// In-memory [`NoteStore`]. Enforces fingerprint uniqueness the way the
/// real store's race surfaces it: a second create for the same fingerprint
/// returns [`StoreError::Conflict`].
#[derive(Default)]
pub struct MemoryNoteStore {
    pages: Mutex<Vec<StoredPage>>,
    counters: Mutex<StoreCounters>,
    next_id: Mutex<u64>,
    fail_next_create: Mutex<Option<StoreError>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing page, as if written by an earlier run.
    pub fn seed_page(&self, properties: PageProperties) -> String {
        self.seed(properties, false)
    }

    /// Seeds a page another writer is creating "right now": invisible to
    /// the dedup check, but present for the create conflict and the
    /// post-conflict recheck.
    pub fn seed_racing_page(&self, properties: PageProperties) -> String {
        self.seed(properties, true)
    }

    fn seed(&self, properties: PageProperties, hidden_until_create: bool) -> String {
        let page_id = self.mint_id();
        self.pages.lock().unwrap().push(StoredPage {
            page_id: page_id.clone(),
            properties,
            blocks: Vec::new(),
            created_time: Utc::now(),
            hidden_until_create,
        });
        page_id
    }

    /// The next `create_page` call fails once with `error`.
    pub fn fail_next_create(&self, error: StoreError) {
        *self.fail_next_create.lock().unwrap() = Some(error);
    }

    pub fn pages(&self) -> Vec<StoredPage> {
        self.pages.lock().unwrap().clone()
    }

    pub fn counters(&self) -> StoreCounters {
        *self.counters.lock().unwrap()
    }

    fn mint_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("page-{:04}", *next)
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PageSummary>, StoreError> {
        let creates_so_far = {
            let mut counters = self.counters.lock().unwrap();
            counters.finds += 1;
            counters.creates
        };
        let pages = self.pages.lock().unwrap();
        let mut matches: Vec<&StoredPage> = pages
            .iter()
            .filter(|p| p.properties.fingerprint == fingerprint)
            .filter(|p| !p.hidden_until_create || creates_so_far > 0)
            .collect();
        matches.sort_by_key(|p| p.created_time);
        Ok(matches.first().map(|p| PageSummary {
            page_id: p.page_id.clone(),
            properties: p.properties.clone(),
            created_time: p.created_time,
        }))
    }

    async fn create_page(
        &self,
        properties: &PageProperties,
        blocks: &[Block],
    ) -> Result<String, StoreError> {
        self.counters.lock().unwrap().creates += 1;

        if let Some(error) = self.fail_next_create.lock().unwrap().take() {
            return Err(error);
        }

        let mut pages = self.pages.lock().unwrap();
        if pages
            .iter()
            .any(|p| p.properties.fingerprint == properties.fingerprint)
        {
            return Err(StoreError::Conflict(properties.fingerprint.clone()));
        }

        let page_id = self.mint_id();
        pages.push(StoredPage {
            page_id: page_id.clone(),
            properties: properties.clone(),
            blocks: blocks.to_vec(),
            created_time: Utc::now(),
            hidden_until_create: false,
        });
        Ok(page_id)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &PageProperties,
        blocks: Option<&[Block]>,
    ) -> Result<(), StoreError> {
        self.counters.lock().unwrap().updates += 1;
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .iter_mut()
            .find(|p| p.page_id == page_id)
            .ok_or_else(|| StoreError::Api {
                status: 404,
                message: format!("no page {page_id}"),
            })?;
        page.properties = properties.clone();
        if let Some(blocks) = blocks {
            page.blocks = blocks.to_vec();
        }
        Ok(())
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), StoreError> {
        self.counters.lock().unwrap().appends += 1;
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .iter_mut()
            .find(|p| p.page_id == page_id)
            .ok_or_else(|| StoreError::Api {
                status: 404,
                message: format!("no page {page_id}"),
            })?;
        page.blocks.extend(blocks.iter().cloned());
        Ok(())
    }
}
