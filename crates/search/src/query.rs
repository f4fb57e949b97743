//! Query translation: date-range filters over `created_at`.

use chrono::{DateTime, Utc};

use reservoir_core::{DomainError, DomainResult};

/// Optional `[start, end]` restriction on an order's creation time.
///
/// Translated into the index's filter language as `created_at >= <start>`
/// and/or `created_at <= <end>` joined with `AND`. Both bounds are
/// inclusive and compared as epoch seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build a range, rejecting an inverted one before any lock or IO
    /// happens downstream.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DomainError::validation(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// The unrestricted range.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The filter expression for the index, or `None` when unrestricted.
    pub fn filter_expression(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(start) = self.start {
            parts.push(format!("created_at >= {}", start.timestamp()));
        }
        if let Some(end) = self.end {
            parts.push(format!("created_at <= {}", end.timestamp()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }

    /// Whether an epoch-seconds timestamp falls inside the range.
    pub fn contains(&self, epoch_seconds: i64) -> bool {
        if let Some(start) = self.start {
            if epoch_seconds < start.timestamp() {
                return false;
            }
        }
        if let Some(end) = self.end {
            if epoch_seconds > end.timestamp() {
                return false;
            }
        }
        true
    }
}
