//! Format writers for export operations
//!
//! Writers serialize documents into an [`OutputSink`]. They never open or
//! close the sink themselves; the workflow owns its lifecycle.

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::Result;

use super::sink::OutputSink;

pub mod csv;
pub mod json;

pub use csv::{CsvColumns, CsvWriter, ScratchFile};
pub use json::JsonArrayWriter;

/// Trait for writing documents in a given file format
#[async_trait]
pub trait FormatWriter: Send {
    /// Write a batch of documents
    ///
    /// # Returns
    /// * `Result<usize>` - Number of documents written
    async fn write_batch(&mut self, sink: &mut OutputSink, docs: &[Document]) -> Result<usize>;

    /// Write trailers and flush format-level state
    async fn finalize(&mut self, sink: &mut OutputSink) -> Result<()>;

    /// Documents written so far
    fn written(&self) -> u64;
}
