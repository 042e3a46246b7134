//! Streaming query abstractions for export operations
//!
//! Find and aggregate cursors are both consumed in batches through
//! [`StreamingQuery`], so exporters never hold more than one batch in memory.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Cursor;
use mongodb::bson::Document;
use tracing::debug;

use crate::error::{ExecutionError, Result};

/// Trait for streaming query results in batches
#[async_trait]
pub trait StreamingQuery: Send {
    /// Fetch the next batch of documents
    ///
    /// # Returns
    /// * `Result<Option<Vec<Document>>>` - Next batch, or None once exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>>;

    /// Release the underlying cursor
    fn close(&mut self);
}

/// Cursor-backed streaming query, used for both find and aggregate
pub struct CursorStreamingQuery {
    cursor: Option<Cursor<Document>>,
    batch_size: u32,
    total_fetched: u64,
    source: &'static str,
}

impl CursorStreamingQuery {
    /// Create a new cursor streaming query
    ///
    /// # Arguments
    /// * `cursor` - MongoDB cursor from find or aggregate
    /// * `batch_size` - Number of documents per batch
    /// * `source` - Source kind for logging ("query" or "aggregation")
    pub fn new(cursor: Cursor<Document>, batch_size: u32, source: &'static str) -> Self {
        Self {
            cursor: Some(cursor),
            batch_size: batch_size.max(1),
            total_fetched: 0,
            source,
        }
    }

    pub fn total_fetched(&self) -> u64 {
        self.total_fetched
    }
}

#[async_trait]
impl StreamingQuery for CursorStreamingQuery {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let mut batch = Vec::with_capacity(self.batch_size as usize);
        while batch.len() < self.batch_size as usize {
            match cursor.try_next().await {
                Ok(Some(doc)) => batch.push(doc),
                Ok(None) => break,
                Err(e) => {
                    // Drop the cursor so the server can reclaim it.
                    self.cursor = None;
                    return Err(ExecutionError::CursorError(e.to_string()).into());
                }
            }
        }

        if batch.is_empty() {
            debug!(
                "{} cursor exhausted after {} documents",
                self.source, self.total_fetched
            );
            self.cursor = None;
            return Ok(None);
        }

        self.total_fetched += batch.len() as u64;
        debug!(
            "Fetched batch of {} documents (total: {})",
            batch.len(),
            self.total_fetched
        );
        Ok(Some(batch))
    }

    fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!(
                "Closed {} cursor after {} documents",
                self.source, self.total_fetched
            );
        }
    }
}
