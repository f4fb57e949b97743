//! Search index abstraction.

use async_trait::async_trait;

use reservoir_core::OrderId;

use crate::document::OrderDocument;
use crate::query::DateRange;

/// Failure talking to the search/index store.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The store could not be reached.
    #[error("search transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("search store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The store's response could not be decoded.
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

/// The queryable document store behind the order projection.
///
/// Writes are upsert/delete per order document; reads are by-id lookup and
/// ranked search with an optional `created_at` range filter. An empty query
/// string is valid and matches every document subject to the filter.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn add_or_update_document(&self, document: &OrderDocument) -> Result<(), SearchError>;

    async fn delete_document(&self, id: OrderId) -> Result<(), SearchError>;

    /// `None` when no document exists for the id.
    async fn get_document(&self, id: OrderId) -> Result<Option<OrderDocument>, SearchError>;

    /// Matches ranked by the underlying index's relevance.
    async fn search(
        &self,
        query: &str,
        range: &DateRange,
    ) -> Result<Vec<OrderDocument>, SearchError>;
}
