//! HTTP client for the Notion API. All requests flow through a single
//! serializer that enforces the minimum inter-request delay, and every
//! operation retries transient failures through the shared combinator.
//! Rate-limit responses wait for the server-indicated interval.

use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{NoteStore, PageProperties, PageStatus, PageSummary};
use crate::errors::StoreError;
use crate::format::blocks::{blocks_to_json, Block};
use crate::prompt_store::{RemotePromptRow, RemotePromptSource};
use crate::prompts::{PromptTemplate, TemplateSource};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Properties the target database must expose; checked at startup.
const REQUIRED_PROPERTIES: &[&str] = &[
    "title",
    "fingerprint",
    "status",
    "content_type",
    "ai_primitives",
    "topical_tags",
    "domain_tags",
    "content_tags",
    "quality_score",
    "drive_url",
    "created_date",
];

fn base_url() -> String {
    env::var("NOTION_API_BASE_URL_OVERRIDE_FOR_TESTING")
        .unwrap_or_else(|_| "https://api.notion.com".to_string())
}

pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    database_id: String,
    data_source_id: tokio::sync::Mutex<Option<String>>,
    /// Serializer: one request at a time, spaced by `min_delay`.
    gate: tokio::sync::Mutex<Option<Instant>>,
    min_delay: Duration,
    retry: RetryPolicy,
}

impl NotionClient {
    pub fn new(
        token: &str,
        version: &str,
        database_id: &str,
        min_delay: Duration,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url(),
            headers: construct_headers(token, version)?,
            database_id: database_id.to_string(),
            data_source_id: tokio::sync::Mutex::new(None),
            gate: tokio::sync::Mutex::new(None),
            min_delay,
            retry: RetryPolicy::store(),
        })
    }

    /// Test seam: points the client at a stand-in server and tightens the
    /// retry policy so backoff does not dominate test time.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_secs(60),
        };
        self
    }

    /// One API call through the serializer, with retries. The request is
    /// rebuilt per attempt so the body can be resent.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let url = format!("{}{path}", self.base_url);
        retry_with_backoff(self.retry, || async {
            let mut gate = self.gate.lock().await;
            if let Some(last) = *gate {
                let elapsed = last.elapsed();
                if elapsed < self.min_delay {
                    tokio::time::sleep(self.min_delay - elapsed).await;
                }
            }

            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await;
            *gate = Some(Instant::now());
            drop(gate);

            let response = response?;
            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(Duration::from_secs_f64);
                return Err(StoreError::RateLimited { retry_after });
            }

            if !(200..300).contains(&status) {
                let body_text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body_text)
                    .ok()
                    .and_then(|v| v["message"].as_str().map(str::to_string))
                    .unwrap_or(body_text);
                if status == 409 || message.contains("conflict") {
                    return Err(StoreError::Conflict(message));
                }
                return Err(StoreError::Api { status, message });
            }
            response
                .json()
                .await
                .map_err(|e| StoreError::Deserialization(e.to_string()))
        })
        .await
    }

    /// Resolves and caches the database's first data source id.
    async fn data_source_id(&self) -> Result<String, StoreError> {
        let mut cached = self.data_source_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let info = self
            .call(
                Method::GET,
                &format!("/v1/databases/{}", self.database_id),
                None,
            )
            .await?;
        let id = info["data_sources"][0]["id"]
            .as_str()
            .ok_or_else(|| {
                StoreError::SchemaMismatch("database has no data sources".to_string())
            })?
            .to_string();
        debug!(data_source_id = %id, "resolved data source");
        *cached = Some(id.clone());
        Ok(id)
    }

    /// Queries a data source with an optional filter, following pagination.
    async fn query_all(
        &self,
        data_source_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut results = Vec::new();
        let mut next_cursor: Option<String> = None;
        loop {
            let mut body = json!({});
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(sorts) = &sorts {
                body["sorts"] = sorts.clone();
            }
            if let Some(cursor) = &next_cursor {
                body["start_cursor"] = json!(cursor);
            }

            let page = self
                .call(
                    Method::POST,
                    &format!("/v1/data_sources/{data_source_id}/query"),
                    Some(&body),
                )
                .await?;

            if let Some(items) = page["results"].as_array() {
                results.extend(items.iter().cloned());
            }
            if page["has_more"].as_bool().unwrap_or(false) {
                next_cursor = page["next_cursor"].as_str().map(str::to_string);
            } else {
                return Ok(results);
            }
        }
    }
}

#[async_trait]
impl NoteStore for NotionClient {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PageSummary>, StoreError> {
        let data_source_id = self.data_source_id().await?;
        let filter = json!({
            "property": "fingerprint",
            "rich_text": { "equals": fingerprint }
        });
        let sorts = json!([{ "timestamp": "created_time", "direction": "ascending" }]);
        let matches = self
            .query_all(&data_source_id, Some(filter), Some(sorts))
            .await?;

        if matches.len() > 1 {
            warn!(
                fingerprint,
                count = matches.len(),
                "multiple pages share a fingerprint; using earliest-created"
            );
        }
        matches
            .first()
            .map(|page| parse_page_summary(page))
            .transpose()
    }

    async fn create_page(
        &self,
        properties: &PageProperties,
        blocks: &[Block],
    ) -> Result<String, StoreError> {
        let data_source_id = self.data_source_id().await?;
        let mut body = json!({
            "parent": { "type": "data_source_id", "data_source_id": data_source_id },
            "properties": properties_to_json(properties),
        });
        if !blocks.is_empty() {
            body["children"] = blocks_to_json(blocks);
        }

        let created = self.call(Method::POST, "/v1/pages", Some(&body)).await?;
        let page_id = created["id"]
            .as_str()
            .ok_or_else(|| StoreError::Deserialization("created page has no id".to_string()))?
            .to_string();
        info!(page_id = %page_id, title = %properties.title, "created destination page");
        Ok(page_id)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &PageProperties,
        blocks: Option<&[Block]>,
    ) -> Result<(), StoreError> {
        let body = json!({ "properties": properties_to_json(properties) });
        self.call(Method::PATCH, &format!("/v1/pages/{page_id}"), Some(&body))
            .await?;

        if let Some(blocks) = blocks {
            // Replacement: archive the existing children, then append.
            let existing = self
                .call(
                    Method::GET,
                    &format!("/v1/blocks/{page_id}/children?page_size=100"),
                    None,
                )
                .await?;
            if let Some(children) = existing["results"].as_array() {
                for child in children {
                    if let Some(id) = child["id"].as_str() {
                        self.call(Method::DELETE, &format!("/v1/blocks/{id}"), None)
                            .await?;
                    }
                }
            }
            self.append_blocks(page_id, blocks).await?;
        }
        info!(page_id, "updated destination page");
        Ok(())
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<(), StoreError> {
        if blocks.is_empty() {
            return Ok(());
        }
        let body = json!({ "children": blocks_to_json(blocks) });
        self.call(
            Method::PATCH,
            &format!("/v1/blocks/{page_id}/children"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn verify_schema(&self) -> Result<(), StoreError> {
        let info = self
            .call(
                Method::GET,
                &format!("/v1/databases/{}", self.database_id),
                None,
            )
            .await?;
        let Some(properties) = info["properties"].as_object() else {
            return Err(StoreError::SchemaMismatch(
                "database exposes no properties".to_string(),
            ));
        };
        let missing: Vec<&str> = REQUIRED_PROPERTIES
            .iter()
            .filter(|name| !properties.contains_key(**name))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaMismatch(format!(
                "missing properties: {}",
                missing.join(", ")
            )))
        }
    }
}

// --- Property conversion ---

fn properties_to_json(p: &PageProperties) -> Value {
    let mut props = json!({
        "title": { "title": [{ "text": { "content": p.title } }] },
        "fingerprint": { "rich_text": [{ "text": { "content": p.fingerprint } }] },
        "status": { "select": { "name": p.status.as_str() } },
        "ai_primitives": multi_select_json(&p.ai_primitives),
        "topical_tags": multi_select_json(&p.topical_tags),
        "domain_tags": multi_select_json(&p.domain_tags),
        "content_tags": multi_select_json(&p.content_tags),
        "created_date": { "date": { "start": p.created_date.to_rfc3339() } },
    });
    if let Some(content_type) = &p.content_type {
        props["content_type"] = json!({ "select": { "name": content_type } });
    }
    if let Some(vendor) = &p.vendor {
        props["vendor"] = json!({ "select": { "name": vendor } });
    }
    if let Some(score) = p.quality_score {
        props["quality_score"] = json!({ "number": score });
    }
    if let Some(url) = &p.drive_url {
        props["drive_url"] = json!({ "url": url });
    }
    props
}

fn multi_select_json(values: &[String]) -> Value {
    json!({
        "multi_select": values.iter().map(|v| json!({ "name": v })).collect::<Vec<_>>()
    })
}

fn parse_page_summary(page: &Value) -> Result<PageSummary, StoreError> {
    let page_id = page["id"]
        .as_str()
        .ok_or_else(|| StoreError::Deserialization("page has no id".to_string()))?
        .to_string();
    let props = &page["properties"];

    let created_time = page["created_time"]
        .as_str()
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now);

    let created_date = props["created_date"]["date"]["start"]
        .as_str()
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
        .unwrap_or(created_time);

    let properties = PageProperties {
        title: title_text(&props["title"]),
        fingerprint: rich_text(&props["fingerprint"]),
        status: props["status"]["select"]["name"]
            .as_str()
            .and_then(PageStatus::parse)
            .unwrap_or(PageStatus::Inbox),
        content_type: select_name(&props["content_type"]),
        vendor: select_name(&props["vendor"]),
        ai_primitives: multi_select(&props["ai_primitives"]),
        topical_tags: multi_select(&props["topical_tags"]),
        domain_tags: multi_select(&props["domain_tags"]),
        content_tags: multi_select(&props["content_tags"]),
        quality_score: props["quality_score"]["number"]
            .as_f64()
            .map(|n| n.clamp(0.0, 100.0) as u8),
        drive_url: props["drive_url"]["url"].as_str().map(str::to_string),
        created_date,
    };

    Ok(PageSummary {
        page_id,
        properties,
        created_time,
    })
}

fn title_text(prop: &Value) -> String {
    concat_plain_text(&prop["title"])
}

fn rich_text(prop: &Value) -> String {
    concat_plain_text(&prop["rich_text"])
}

fn concat_plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn select_name(prop: &Value) -> Option<String> {
    prop["select"]["name"].as_str().map(str::to_string)
}

fn multi_select(prop: &Value) -> Vec<String> {
    prop["multi_select"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn construct_headers(token: &str, version: &str) -> Result<HeaderMap, StoreError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| StoreError::Api {
                status: 0,
                message: format!("invalid token: {e}"),
            })?,
    );
    headers.insert(
        "Notion-Version",
        HeaderValue::from_str(version).map_err(|e| StoreError::Api {
            status: 0,
            message: format!("invalid version: {e}"),
        })?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

// --- Remote prompt source ---

/// Reads prompt templates out of a second Notion database. Rows carry the
/// template fields as properties; rows created before key normalization may
/// set `legacy_key` to their verbatim cache key.
pub struct NotionPromptSource {
    client: std::sync::Arc<NotionClient>,
    prompts_database_id: String,
}

impl NotionPromptSource {
    pub fn new(client: std::sync::Arc<NotionClient>, prompts_database_id: &str) -> Self {
        Self {
            client,
            prompts_database_id: prompts_database_id.to_string(),
        }
    }
}

#[async_trait]
impl RemotePromptSource for NotionPromptSource {
    async fn fetch_all(&self) -> Result<Vec<RemotePromptRow>, StoreError> {
        let info = self
            .client
            .call(
                Method::GET,
                &format!("/v1/databases/{}", self.prompts_database_id),
                None,
            )
            .await?;
        let data_source_id = info["data_sources"][0]["id"]
            .as_str()
            .ok_or_else(|| {
                StoreError::SchemaMismatch("prompt database has no data sources".to_string())
            })?
            .to_string();

        let pages = self.client.query_all(&data_source_id, None, None).await?;
        let mut rows = Vec::with_capacity(pages.len());
        for page in &pages {
            let props = &page["properties"];
            let id = page["id"].as_str().unwrap_or_default().to_string();
            let name = title_text(&props["name"]);
            let content_type = rich_text(&props["content_type"]);
            let analyzer = select_name(&props["analyzer"]).unwrap_or_default();
            if analyzer.is_empty() {
                warn!(prompt = %name, "prompt row has no analyzer, skipping");
                continue;
            }
            let legacy_key = {
                let raw = rich_text(&props["legacy_key"]);
                (!raw.is_empty()).then_some(raw)
            };

            rows.push(RemotePromptRow {
                content_type,
                analyzer,
                legacy_key,
                template: PromptTemplate {
                    id,
                    name,
                    system_text: rich_text(&props["system"]),
                    user_template: rich_text(&props["user"]),
                    temperature: props["temperature"]["number"].as_f64().unwrap_or(0.0) as f32,
                    web_search_enabled: props["web_search"]["checkbox"].as_bool().unwrap_or(false),
                    quality_threshold: props["quality_threshold"]["number"]
                        .as_f64()
                        .map(|n| n.clamp(0.0, 100.0) as u8),
                    version: props["version"]["number"].as_f64().unwrap_or(1.0) as u32,
                    source: TemplateSource::Remote,
                },
            });
        }
        info!(count = rows.len(), "fetched remote prompt rows");
        Ok(rows)
    }
}
