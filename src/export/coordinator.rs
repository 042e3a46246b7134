//! Export coordinator
//!
//! Drives a [`StreamingQuery`] into a sink through a format writer, checking
//! the cancellation token between documents and reporting progress.

use std::path::Path;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;

use super::service::{CsvPhase, ExportResult, ProgressCallback};
use super::sink::OutputSink;
use super::streaming::StreamingQuery;
use super::writers::{CsvColumns, CsvWriter, FormatWriter, JsonArrayWriter, ScratchFile};

/// Coordinator for one export run
pub struct ExportCoordinator<'a> {
    query: Box<dyn StreamingQuery + 'a>,
    token: CancellationToken,
    progress: ProgressCallback,
}

impl<'a> ExportCoordinator<'a> {
    pub fn new(
        query: Box<dyn StreamingQuery + 'a>,
        token: CancellationToken,
        progress: ProgressCallback,
    ) -> Self {
        Self {
            query,
            token,
            progress,
        }
    }

    /// Stream every document into a JSON array
    ///
    /// On cancel the array is still terminated so the file stays parseable.
    pub async fn run_json(
        mut self,
        mut writer: JsonArrayWriter,
        sink: &mut OutputSink,
    ) -> Result<ExportResult> {
        let start = Instant::now();
        let outcome = self.stream_into(&mut writer, sink).await;
        self.query.close();
        let aborted = outcome?;

        writer.finalize(sink).await?;

        let result = ExportResult {
            docs_written: writer.written(),
            aborted,
        };
        info!(
            "JSON export {}: {} documents in {} ms",
            if aborted { "aborted" } else { "completed" },
            result.docs_written,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Download to a scratch file, then write CSV with the discovered columns
    ///
    /// # Arguments
    /// * `scratch_dir` - Directory for the intermediate file
    /// * `delimiter` - CSV field separator
    /// * `sink` - Output
    pub async fn run_csv(
        mut self,
        scratch_dir: &Path,
        delimiter: char,
        sink: &mut OutputSink,
    ) -> Result<ExportResult> {
        let start = Instant::now();
        let mut scratch = ScratchFile::create(scratch_dir).await?;

        let downloaded = self.download(&mut scratch).await;
        self.query.close();

        let columns = match downloaded {
            Ok(Some(columns)) => columns,
            Ok(None) => {
                scratch.remove()?;
                info!("CSV export aborted while downloading");
                return Ok(ExportResult {
                    docs_written: 0,
                    aborted: true,
                });
            }
            Err(e) => {
                scratch.remove().ok();
                return Err(e);
            }
        };

        let written = self.write_rows(&mut scratch, columns, delimiter, sink).await;
        scratch.remove()?;
        let result = written?;

        info!(
            "CSV export {}: {} documents in {} ms",
            if result.aborted { "aborted" } else { "completed" },
            result.docs_written,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Returns None when cancelled
    async fn download(&mut self, scratch: &mut ScratchFile) -> Result<Option<CsvColumns>> {
        let mut columns = CsvColumns::new();

        while let Some(docs) = self.query.next_batch().await? {
            for doc in &docs {
                if self.token.is_cancelled() {
                    return Ok(None);
                }
                scratch.append(doc).await?;
                columns.add_document(doc);
                (self.progress)(scratch.len(), Some(CsvPhase::Download));
            }
        }

        if self.token.is_cancelled() {
            return Ok(None);
        }

        debug!(
            "Downloaded {} documents with {} columns",
            scratch.len(),
            columns.len()
        );
        Ok(Some(columns))
    }

    async fn write_rows(
        &mut self,
        scratch: &mut ScratchFile,
        columns: CsvColumns,
        delimiter: char,
        sink: &mut OutputSink,
    ) -> Result<ExportResult> {
        let mut writer = CsvWriter::new(columns.into_columns(), delimiter);
        let mut reader = scratch.reader().await?;
        let mut aborted = false;

        while let Some(doc) = reader.next().await? {
            if self.token.is_cancelled() {
                aborted = true;
                break;
            }
            writer.write_batch(sink, std::slice::from_ref(&doc)).await?;
            (self.progress)(writer.written(), Some(CsvPhase::Write));
        }

        writer.finalize(sink).await?;
        Ok(ExportResult {
            docs_written: writer.written(),
            aborted,
        })
    }

    /// Returns whether the run was cancelled
    async fn stream_into(
        &mut self,
        writer: &mut dyn FormatWriter,
        sink: &mut OutputSink,
    ) -> Result<bool> {
        let mut batch_count = 0u32;

        while let Some(docs) = self.query.next_batch().await? {
            for doc in &docs {
                if self.token.is_cancelled() {
                    info!("Export cancelled after {} documents", writer.written());
                    return Ok(true);
                }
                writer.write_batch(sink, std::slice::from_ref(doc)).await?;
                (self.progress)(writer.written(), None);
            }

            batch_count += 1;
            if batch_count % 10 == 0 {
                info!(
                    "Progress: {} documents exported ({} batches)",
                    writer.written(),
                    batch_count
                );
            }
        }

        Ok(self.token.is_cancelled())
    }
}
