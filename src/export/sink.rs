//! Output sinks: the byte stream an export writes to.
//!
//! A sink is exclusively owned by one export run and must be closed on every
//! exit path. `close` is idempotent so cleanup code can call it without
//! tracking whether an earlier step already did.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::error::{OutputError, Result};

/// Buffer size for file-backed sinks
const FILE_BUFFER_SIZE: usize = 1024 * 1024;

/// Writable byte stream bound to a path
pub struct OutputSink {
    path: PathBuf,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    bytes_written: u64,
}

impl OutputSink {
    /// Wrap an arbitrary writer
    pub fn new<W>(path: impl Into<PathBuf>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            path: path.into(),
            writer: Some(Box::new(writer)),
            bytes_written: 0,
        }
    }

    /// Create (or truncate) a file and wrap it in a buffered sink
    pub async fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;

        let file = File::create(path).await.map_err(|e| OutputError::CreateFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!("Created output file: {}", path.display());
        Ok(Self::new(path, BufWriter::with_capacity(FILE_BUFFER_SIZE, file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Write the whole buffer
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| OutputError::Closed(self.path.display().to_string()))?;

        writer
            .write_all(buf)
            .await
            .map_err(|e| OutputError::WriteFailed(e.to_string()))?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Flush and shut the writer down
    ///
    /// # Returns
    /// * `Result<bool>` - `true` if this call closed the sink, `false` if it
    ///   was already closed
    pub async fn close(&mut self) -> Result<bool> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(false);
        };

        // Shutdown flushes buffered writers before closing.
        writer
            .shutdown()
            .await
            .map_err(|e| OutputError::WriteFailed(e.to_string()))?;

        debug!(
            "Closed output {} ({} bytes)",
            self.path.display(),
            self.bytes_written
        );
        Ok(true)
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(
                "Output {} dropped without being closed; buffered data may be lost",
                self.path.display()
            );
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens sinks for a file path
#[async_trait]
pub trait OutputOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<OutputSink>;
}

/// Opens buffered files on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOutputOpener;

#[async_trait]
impl OutputOpener for FileOutputOpener {
    async fn open(&self, path: &Path) -> Result<OutputSink> {
        OutputSink::create(path).await
    }
}

/// Check that the parent directory of `path` exists
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(OutputError::CreateFailed {
                path: path.display().to_string(),
                reason: format!("directory does not exist: {}", parent.display()),
            }
            .into());
        }
    }

    Ok(())
}
