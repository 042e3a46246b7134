//! CSV writer for export operations
//!
//! CSV export runs in two phases. Documents are first downloaded into a
//! [`ScratchFile`] while [`CsvColumns`] records every flattened field path;
//! once the column set is known, [`CsvWriter`] replays the scratch file into
//! the output with a single header row.
//!
//! Nested documents flatten to dotted paths (`address.city`) and arrays to
//! indexed paths (`tags[0]`).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::{ExecutionError, Result};
use crate::export::sink::OutputSink;

use super::FormatWriter;

/// One step of a column path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSegment {
    Field(String),
    Index(usize),
}

/// Position of a CSV column inside nested documents and arrays
///
/// Columns are told apart by their segments, never by the rendered header,
/// so a literal `"a.b"` key and a nested `a` → `b` stay separate columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ColumnPath(Vec<ColumnSegment>);

impl ColumnPath {
    /// Top-level field
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![ColumnSegment::Field(name.into())])
    }

    /// Nested field below this path
    pub fn then_field(mut self, name: impl Into<String>) -> Self {
        self.0.push(ColumnSegment::Field(name.into()));
        self
    }

    /// Array element below this path
    pub fn then_index(mut self, index: usize) -> Self {
        self.0.push(ColumnSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[ColumnSegment] {
        &self.0
    }

    /// Header text: `a.b` for nesting, `a[0]` for arrays
    ///
    /// Field names that are empty or contain `.`, `[`, `]` or `"` are
    /// wrapped in double quotes (inner quotes doubled), which keeps distinct
    /// paths distinct once rendered.
    pub fn header(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                ColumnSegment::Field(name) => {
                    if i > 0 {
                        out.push('.');
                    }
                    push_field_name(&mut out, name);
                }
                ColumnSegment::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

fn push_field_name(out: &mut String, name: &str) {
    if name.is_empty() || name.contains(['.', '[', ']', '"']) {
        out.push('"');
        out.push_str(&name.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(name);
    }
}

/// Flatten a document into `(column, value)` pairs in document order
pub fn flatten_document(doc: &Document) -> Vec<(ColumnPath, Bson)> {
    let mut prefix = Vec::new();
    let mut out = Vec::new();
    for (key, value) in doc {
        prefix.push(ColumnSegment::Field(key.clone()));
        flatten_value(&mut prefix, value, &mut out);
        prefix.pop();
    }
    out
}

fn flatten_value(prefix: &mut Vec<ColumnSegment>, value: &Bson, out: &mut Vec<(ColumnPath, Bson)>) {
    match value {
        Bson::Document(sub) if !sub.is_empty() => {
            for (key, value) in sub {
                prefix.push(ColumnSegment::Field(key.clone()));
                flatten_value(prefix, value, out);
                prefix.pop();
            }
        }
        Bson::Array(items) if !items.is_empty() => {
            for (i, value) in items.iter().enumerate() {
                prefix.push(ColumnSegment::Index(i));
                flatten_value(prefix, value, out);
                prefix.pop();
            }
        }
        _ => out.push((ColumnPath(prefix.clone()), value.clone())),
    }
}

/// Render one scalar as cell text
///
/// Strings are written verbatim, numbers and booleans in their natural form,
/// dates as RFC 3339. Anything else falls back to relaxed Extended JSON.
pub fn cell_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null | Bson::Undefined => String::new(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Decimal128(d) => d.to_string(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Quote a cell when it contains the delimiter, a quote or a line break
pub fn escape_csv_value(value: &str, delimiter: char) -> String {
    if value.contains(delimiter)
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Ordered set of columns, in first-seen order
#[derive(Debug, Default, Clone)]
pub struct CsvColumns {
    columns: Vec<ColumnPath>,
    seen: HashSet<ColumnPath>,
}

impl CsvColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the flattened columns of a document
    pub fn add_document(&mut self, doc: &Document) {
        for (column, _) in flatten_document(doc) {
            if !self.seen.contains(&column) {
                self.seen.insert(column.clone());
                self.columns.push(column);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_columns(self) -> Vec<ColumnPath> {
        self.columns
    }
}

/// Length-prefixed BSON file used between the download and write phases
///
/// The file lives in a [`TempPath`], so it is deleted by
/// [`ScratchFile::remove`] or, failing that, when dropped.
pub struct ScratchFile {
    path: TempPath,
    writer: Option<BufWriter<File>>,
    count: u64,
}

impl ScratchFile {
    /// Create a uniquely named scratch file inside `dir`
    pub async fn create(dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("mongo-export-")
            .suffix(".bson")
            .tempfile_in(dir)
            .map_err(|e| {
                ExecutionError::ExportFailed(format!(
                    "Failed to create scratch file in {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        let (file, path) = file.into_parts();

        debug!("Created scratch file: {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(File::from_std(file))),
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Documents appended so far
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append one document
    pub async fn append(&mut self, doc: &Document) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            ExecutionError::InvalidOperation("scratch file is sealed".to_string())
        })?;

        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes)?;
        writer.write_all(&bytes).await?;
        self.count += 1;
        Ok(())
    }

    /// Flush pending writes and open the file for reading
    pub async fn reader(&mut self) -> Result<ScratchReader> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
        }

        let file = File::open(self.path()).await?;
        Ok(ScratchReader {
            reader: BufReader::new(file),
        })
    }

    /// Delete the file from disk
    pub fn remove(self) -> Result<()> {
        let Self { path, writer, .. } = self;
        drop(writer);
        let path_display = path.display().to_string();
        path.close()?;
        debug!("Removed scratch file: {}", path_display);
        Ok(())
    }
}

/// Sequential reader over a [`ScratchFile`]
pub struct ScratchReader {
    reader: BufReader<File>,
}

impl ScratchReader {
    /// Read the next document, or None at end of file
    pub async fn next(&mut self) -> Result<Option<Document>> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = i32::from_le_bytes(len_bytes);
        if len < 5 {
            return Err(ExecutionError::ExportFailed(format!(
                "corrupt scratch file: document length {}",
                len
            ))
            .into());
        }

        let mut bytes = vec![0u8; len as usize];
        bytes[..4].copy_from_slice(&len_bytes);
        self.reader.read_exact(&mut bytes[4..]).await?;

        Ok(Some(Document::from_reader(bytes.as_slice())?))
    }
}

/// Writer for CSV rows once the column set is known
pub struct CsvWriter {
    columns: Vec<ColumnPath>,
    delimiter: char,
    headers_written: bool,
    written: u64,
}

impl CsvWriter {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `columns` - Columns, in output order
    /// * `delimiter` - Field separator
    pub fn new(columns: Vec<ColumnPath>, delimiter: char) -> Self {
        Self {
            columns,
            delimiter,
            headers_written: false,
            written: 0,
        }
    }

    fn join(&self, cells: impl Iterator<Item = String>) -> String {
        let mut line = cells
            .map(|cell| escape_csv_value(&cell, self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        line.push('\n');
        line
    }

    async fn write_headers(&mut self, sink: &mut OutputSink) -> Result<()> {
        if self.headers_written {
            return Ok(());
        }

        let line = self.join(self.columns.iter().map(ColumnPath::header));
        sink.write_all(line.as_bytes()).await?;
        self.headers_written = true;

        debug!("Wrote CSV headers: {} fields", self.columns.len());
        Ok(())
    }

    /// Format one document as a row
    pub fn format_row(&self, doc: &Document) -> String {
        let mut cells: HashMap<ColumnPath, Bson> = flatten_document(doc).into_iter().collect();
        self.join(self.columns.iter().map(|column| {
            cells
                .remove(column)
                .map(|value| cell_value(&value))
                .unwrap_or_default()
        }))
    }
}

#[async_trait]
impl FormatWriter for CsvWriter {
    async fn write_batch(&mut self, sink: &mut OutputSink, docs: &[Document]) -> Result<usize> {
        self.write_headers(sink).await?;

        for doc in docs {
            let row = self.format_row(doc);
            sink.write_all(row.as_bytes()).await?;
        }

        self.written += docs.len() as u64;
        Ok(docs.len())
    }

    async fn finalize(&mut self, sink: &mut OutputSink) -> Result<()> {
        self.write_headers(sink).await?;
        debug!("Finalized CSV output ({} documents)", self.written);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}
