//! Service seams for field discovery and export execution.
//!
//! The workflow only talks to these traits. `super::mongo` provides the
//! MongoDB-backed implementations; tests substitute their own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

use super::fields::SchemaPath;
use super::options::{ExportQuery, ExportSource};
use super::sink::OutputSink;

/// Phase of a CSV export
///
/// CSV needs the full column set before the header can be written, so
/// documents are first downloaded to scratch storage and then written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvPhase {
    Download,
    Write,
}

impl fmt::Display for CsvPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvPhase::Download => f.write_str("downloading"),
            CsvPhase::Write => f.write_str("writing"),
        }
    }
}

/// Progress callback: documents processed so far and the CSV phase, if any
pub type ProgressCallback = Arc<dyn Fn(u64, Option<CsvPhase>) + Send + Sync>;

/// Input of a field discovery call
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub namespace: String,
    pub query: Option<ExportQuery>,
    pub sample_size: u32,
    pub token: CancellationToken,
}

/// Output of a field discovery call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub paths: Vec<SchemaPath>,
    pub aborted: bool,
}

/// Samples documents and reports the field paths seen
#[async_trait]
pub trait FieldDiscovery: Send + Sync {
    async fn discover(&self, request: DiscoveryRequest) -> Result<DiscoveryResult>;
}

/// Options shared by every export flavour
pub struct ExportOptions<'a> {
    pub namespace: &'a str,
    pub token: CancellationToken,
    pub progress: ProgressCallback,
    pub output: &'a mut OutputSink,
}

/// Outcome of an export run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportResult {
    pub docs_written: u64,
    pub aborted: bool,
}

/// Streams documents from a source into a sink
///
/// Implementations must observe `options.token` and return promptly with
/// `aborted = true` once it is cancelled. They must not close the sink.
#[async_trait]
pub trait ExportService: Send + Sync {
    async fn export_csv(
        &self,
        options: ExportOptions<'_>,
        source: &ExportSource,
    ) -> Result<ExportResult>;

    async fn export_json(
        &self,
        options: ExportOptions<'_>,
        source: &ExportSource,
    ) -> Result<ExportResult>;
}
