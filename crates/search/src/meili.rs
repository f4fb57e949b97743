//! Meilisearch-backed search index.
//!
//! Talks to the Meilisearch REST API directly: document writes are
//! accepted asynchronously by the server (task queue), which is exactly
//! the eventual consistency the projection contract allows.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::instrument;

use reservoir_core::OrderId;

use crate::document::OrderDocument;
use crate::index::{SearchError, SearchIndex};
use crate::query::DateRange;

const DEFAULT_INDEX_UID: &str = "orders";

/// Client for one Meilisearch index holding order documents.
#[derive(Debug, Clone)]
pub struct MeilisearchIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    index_uid: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<OrderDocument>,
}

impl MeilisearchIndex {
    /// Point the client at a Meilisearch instance (e.g.
    /// `http://meilisearch:7700`), authenticating with `api_key` if given.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            index_uid: DEFAULT_INDEX_UID.to_string(),
        }
    }

    /// Declare which fields are searchable and which are filterable.
    ///
    /// Run once at service start; settings updates are idempotent on the
    /// server side.
    pub async fn ensure_settings(&self) -> Result<(), SearchError> {
        self.send(
            self.request(Method::PUT, "settings/searchable-attributes")
                .json(&["id", "name", "description", "created_at"]),
        )
        .await?;
        self.send(
            self.request(Method::PUT, "settings/filterable-attributes")
                .json(&["created_at"]),
        )
        .await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/indexes/{}/{}", self.base_url, self.index_uid, path);
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, SearchError> {
        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SearchIndex for MeilisearchIndex {
    #[instrument(skip(self, document), fields(order_id = %document.id), err)]
    async fn add_or_update_document(&self, document: &OrderDocument) -> Result<(), SearchError> {
        // The documents endpoint upserts by primary key.
        self.send(
            self.request(Method::POST, "documents")
                .json(&[document]),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_document(&self, id: OrderId) -> Result<(), SearchError> {
        self.send(self.request(Method::DELETE, &format!("documents/{id}")))
            .await?;
        Ok(())
    }

    async fn get_document(&self, id: OrderId) -> Result<Option<OrderDocument>, SearchError> {
        let response = self
            .request(Method::GET, &format!("documents/{id}"))
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let document = response
            .json::<OrderDocument>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(Some(document))
    }

    async fn search(
        &self,
        query: &str,
        range: &DateRange,
    ) -> Result<Vec<OrderDocument>, SearchError> {
        let mut body = serde_json::json!({ "q": query });
        if let Some(filter) = range.filter_expression() {
            body["filter"] = serde_json::Value::String(filter);
        }

        let response = self
            .send(self.request(Method::POST, "search").json(&body))
            .await?;

        let parsed = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(parsed.hits)
    }
}
