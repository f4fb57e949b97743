//! In-memory search index for tests.
//!
//! Implements the same contract over a map: substring matching across the
//! searchable fields and inclusive `created_at` range filtering. Relevance
//! ranking belongs to the real index; this fake returns matches in id
//! order, so tests should not assert on ranking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use reservoir_core::OrderId;

use crate::document::OrderDocument;
use crate::index::{SearchError, SearchIndex};
use crate::query::DateRange;

/// Test double for the Meilisearch adapter.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<BTreeMap<i64, OrderDocument>>,
    fail_writes: AtomicBool,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with a transport error (for exercising
    /// the post-commit outbox path).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), SearchError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SearchError::Transport(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }
}

fn matches_query(document: &OrderDocument, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    let mut haystacks = vec![
        document.id.to_string(),
        document.name.to_lowercase(),
        document.created_at.to_string(),
    ];
    if let Some(description) = &document.description {
        haystacks.push(description.to_lowercase());
    }
    haystacks.iter().any(|h| h.contains(&needle))
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn add_or_update_document(&self, document: &OrderDocument) -> Result<(), SearchError> {
        self.check_writable()?;
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.get(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: OrderId) -> Result<(), SearchError> {
        self.check_writable()?;
        self.documents.lock().unwrap().remove(&id.get());
        Ok(())
    }

    async fn get_document(&self, id: OrderId) -> Result<Option<OrderDocument>, SearchError> {
        Ok(self.documents.lock().unwrap().get(&id.get()).cloned())
    }

    async fn search(
        &self,
        query: &str,
        range: &DateRange,
    ) -> Result<Vec<OrderDocument>, SearchError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|d| range.contains(d.created_at) && matches_query(d, query))
            .cloned()
            .collect())
    }
}
