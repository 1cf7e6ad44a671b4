//! # Notion client
//!
//! [`NotionClient`] implements the core [`Source`] trait against Notion's private v3 API,
//! authenticated with the `token_v2` session cookie.
//!
//! - `loadPageChunk` resolves the configured view page and loads page content, following
//!   the chunk cursor until the page is complete.
//! - `queryCollection` lists the rows of the collection (through the resolved view).
//! - `getRecordValues` fetches link targets that a page chunk did not include.
//! - `submitTransaction` writes property values back (the Status write-back).
//!
//! There is no push transport: [`Source::subscribe`] only records the registration, so in
//! watch mode changes are picked up by the poll timer.
//!
//! JSON → model conversion lives in [`records`].

pub mod records;

use anyhow::Context;
use async_trait::async_trait;
use notion_sync_core::contract::{
    ChangeNotice, Source, SourceError, SubscriptionHandle, SubscriptionTarget,
};
use notion_sync_core::model::{PropertyValue, Row, RowId};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use records::Records;

pub const NOTION_API_BASE: &str = "https://www.notion.so/api/v3";
const PAGE_CHUNK_LIMIT: u64 = 100;
const MAX_PAGE_CHUNKS: u64 = 1000;
const QUERY_LIMIT: u64 = 10_000;

/// The collection behind the configured sync root.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRoot {
    pub collection_id: String,
    pub view_id: Option<String>,
}

#[derive(Serialize)]
struct Operation<'a> {
    id: &'a str,
    table: &'a str,
    path: Vec<&'a str>,
    command: &'a str,
    args: Value,
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    /// Collection id → view id used for `queryCollection`.
    views: Mutex<HashMap<String, String>>,
    subscriptions: Mutex<HashMap<SubscriptionHandle, SubscriptionTarget>>,
}

impl NotionClient {
    pub fn new(token_v2: &str) -> anyhow::Result<Self> {
        Self::with_base_url(token_v2, NOTION_API_BASE)
    }

    pub fn with_base_url(token_v2: &str, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(&format!("token_v2={token_v2}"))
            .context("token_v2 contains characters not allowed in a cookie")?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.into();
        tracing::info!(base_url = %base_url, "Initialized NotionClient");

        Ok(Self {
            http,
            base_url,
            views: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        tracing::debug!(url = %url, "Calling Notion API");
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            tracing::error!(endpoint, status = %status, body = %text, "Notion API call failed");
            return Err(format!("Notion API {endpoint} returned {status}: {text}").into());
        }
        Ok(response.json::<Value>().await?)
    }

    /// Resolve a collection-view URL or page id to the collection it shows.
    ///
    /// The view id comes from the URL's `?v=` parameter, or else the page's first view.
    pub async fn resolve_collection(&self, sync_root: &str) -> anyhow::Result<CollectionRoot> {
        let (page_id, view_from_url) = records::parse_sync_root(sync_root)
            .with_context(|| format!("sync_root {sync_root:?} does not contain a Notion id"))?;

        let mut blocks = Records::new();
        let response = self
            .load_page_chunk(&page_id, 0, &json!({ "stack": [] }))
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Failed to load page {page_id}"))?;
        records::collect_records(&response, "block", &mut blocks);

        let page = blocks
            .get(&page_id)
            .with_context(|| format!("Page {page_id} not found or not shared with this account"))?;
        let kind = page.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind != "collection_view_page" && kind != "collection_view" {
            anyhow::bail!("Page {page_id} is a {kind:?} block, not a collection view");
        }

        let collection_id = page
            .get("collection_id")
            .and_then(Value::as_str)
            .with_context(|| format!("Collection view {page_id} has no collection"))?
            .to_string();
        let first_view = page
            .get("view_ids")
            .and_then(Value::as_array)
            .and_then(|views| views.first())
            .and_then(Value::as_str)
            .map(str::to_string);
        let view_id = view_from_url.or(first_view);

        match &view_id {
            Some(view_id) => {
                self.views
                    .lock()
                    .map_err(|_| anyhow::anyhow!("view registry poisoned"))?
                    .insert(collection_id.clone(), view_id.clone());
            }
            None => tracing::warn!(collection_id = %collection_id, "Collection has no view, rows cannot be queried"),
        }

        Ok(CollectionRoot {
            collection_id,
            view_id,
        })
    }

    async fn load_page_chunk(
        &self,
        page_id: &str,
        chunk_number: u64,
        cursor: &Value,
    ) -> Result<Value, SourceError> {
        let body = json!({
            "pageId": page_id,
            "limit": PAGE_CHUNK_LIMIT,
            "cursor": cursor,
            "chunkNumber": chunk_number,
            "verticalColumns": false,
        });
        self.post("loadPageChunk", &body).await
    }

    /// All block records of a page, following the chunk cursor.
    async fn load_page_records(&self, page_id: &str) -> Result<Records, SourceError> {
        let mut blocks = Records::new();
        let mut cursor = json!({ "stack": [] });
        for chunk_number in 0..MAX_PAGE_CHUNKS {
            let response = self.load_page_chunk(page_id, chunk_number, &cursor).await?;
            records::collect_records(&response, "block", &mut blocks);
            cursor = response.get("cursor").cloned().unwrap_or(Value::Null);
            let more = cursor
                .get("stack")
                .and_then(Value::as_array)
                .is_some_and(|stack| !stack.is_empty());
            if !more {
                break;
            }
        }

        let missing = records::missing_alias_targets(&blocks);
        if !missing.is_empty() {
            self.load_block_records(&missing, &mut blocks).await?;
        }
        Ok(blocks)
    }

    async fn load_block_records(&self, ids: &[String], into: &mut Records) -> Result<(), SourceError> {
        let requests: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "table": "block", "id": id }))
            .collect();
        let response = self
            .post("getRecordValues", &json!({ "requests": requests }))
            .await?;
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (id, result) in ids.iter().zip(results) {
            if let Some(value) = result.get("value").filter(|v| v.is_object()) {
                into.insert(id.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn view_for(&self, collection_id: &str) -> Result<String, SourceError> {
        let views = self
            .views
            .lock()
            .map_err(|_| SourceError::from("view registry poisoned"))?;
        views
            .get(collection_id)
            .cloned()
            .ok_or_else(|| format!("collection {collection_id} has not been resolved to a view").into())
    }
}

fn row_ids(result: &Value) -> Vec<String> {
    let ids = result.get("blockIds").or_else(|| {
        result
            .get("reducerResults")
            .and_then(|r| r.get("collection_group_results"))
            .and_then(|r| r.get("blockIds"))
    });
    ids.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Source for NotionClient {
    async fn get_rows(&self, collection_id: &str) -> Result<Vec<Row>, SourceError> {
        let view_id = self.view_for(collection_id)?;
        tracing::info!(collection_id, view_id = %view_id, "Querying collection");

        let body = json!({
            "collectionId": collection_id,
            "collectionViewId": view_id,
            "query": {},
            "loader": {
                "type": "reducer",
                "reducers": {
                    "collection_group_results": { "type": "results", "limit": QUERY_LIMIT }
                },
                "searchQuery": "",
                "userTimeZone": "UTC",
            },
        });
        let response = self.post("queryCollection", &body).await?;
        let ids = row_ids(response.get("result").unwrap_or(&Value::Null));

        let mut collections = Records::new();
        records::collect_records(&response, "collection", &mut collections);
        let schema = collections
            .get(collection_id)
            .map(records::parse_schema)
            .unwrap_or_default();
        if schema.is_empty() {
            tracing::warn!(collection_id, "Collection schema missing from query response");
        }

        let mut row_records = Records::new();
        records::collect_records(&response, "block", &mut row_records);

        let mut rows = Vec::with_capacity(ids.len());
        for id in &ids {
            let blocks = self.load_page_records(id).await?;
            let Some(record) = blocks.get(id).or_else(|| row_records.get(id)) else {
                tracing::warn!(row_id = %id, "Row record not returned, skipping");
                continue;
            };
            rows.push(records::build_row(id, record, &schema, &blocks));
        }
        tracing::info!(collection_id, rows = rows.len(), "Loaded collection snapshot");
        Ok(rows)
    }

    async fn set_property(
        &self,
        row_id: &RowId,
        property_id: &str,
        value: PropertyValue,
    ) -> Result<(), SourceError> {
        tracing::info!(row_id = %row_id, property_id, value = ?value, "Writing property back");
        let operation = Operation {
            id: row_id.as_str(),
            table: "block",
            path: vec!["properties", property_id],
            command: "set",
            args: records::encode_property(&value),
        };
        self.post("submitTransaction", &json!({ "operations": [operation] }))
            .await?;
        Ok(())
    }

    fn subscribe(
        &self,
        target: SubscriptionTarget,
        _notices: mpsc::Sender<ChangeNotice>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        tracing::debug!(?target, handle = %handle.0, "Registered subscription (poll only)");
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.insert(handle, target);
        }
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            if let Some(target) = subscriptions.remove(&handle) {
                tracing::debug!(?target, handle = %handle.0, "Removed subscription");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ids_accepts_both_query_shapes() {
        let legacy = json!({ "blockIds": ["a", "b"] });
        let reducer = json!({
            "reducerResults": { "collection_group_results": { "blockIds": ["c"] } }
        });
        assert_eq!(row_ids(&legacy), vec!["a", "b"]);
        assert_eq!(row_ids(&reducer), vec!["c"]);
        assert!(row_ids(&Value::Null).is_empty());
    }

    #[test]
    fn subscriptions_are_tracked_until_released() {
        let client = NotionClient::new("secret").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let handle = client.subscribe(SubscriptionTarget::Collection("c".into()), tx);
        assert_eq!(client.subscriptions.lock().unwrap().len(), 1);
        client.unsubscribe(handle);
        client.unsubscribe(handle);
        assert!(client.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_rows_requires_resolved_collection() {
        let client = NotionClient::new("secret").unwrap();
        let err = client.get_rows("unknown").await.unwrap_err();
        assert!(err.to_string().contains("has not been resolved"));
    }

    #[test]
    fn set_property_operation_shape() {
        let operation = Operation {
            id: "row",
            table: "block",
            path: vec!["properties", "st"],
            command: "set",
            args: records::encode_property(&PropertyValue::Select("Published".into())),
        };
        assert_eq!(
            serde_json::to_value(&operation).unwrap(),
            json!({
                "id": "row",
                "table": "block",
                "path": ["properties", "st"],
                "command": "set",
                "args": [["Published"]]
            })
        );
    }
}
