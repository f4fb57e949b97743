//! `reservoir-search` — the denormalized, queryable order projection store.
//!
//! Each order has one document here: header fields plus an embedded
//! snapshot of every line's product at indexing time. The projection is
//! eventually consistent with the ledger and is the sole source for order
//! reads (lookup, listing, full-text search, date-range filtering).

pub mod document;
pub mod in_memory;
pub mod index;
pub mod meili;
pub mod query;

pub use document::{OrderDocument, ProductSnapshot};
pub use in_memory::InMemorySearchIndex;
pub use index::{SearchError, SearchIndex};
pub use meili::MeilisearchIndex;
pub use query::DateRange;
