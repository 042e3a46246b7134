//! JSON array writer
//!
//! Documents are written as elements of one JSON array, each encoded as
//! Extended JSON and pretty-printed.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tracing::debug;

use crate::config::JsonVariant;
use crate::error::Result;
use crate::export::sink::OutputSink;

use super::FormatWriter;

/// Writer for JSON array output
pub struct JsonArrayWriter {
    variant: JsonVariant,
    written: u64,
    opened: bool,
}

impl JsonArrayWriter {
    pub fn new(variant: JsonVariant) -> Self {
        Self {
            variant,
            written: 0,
            opened: false,
        }
    }

    /// Encode one document in the configured Extended JSON flavour
    pub fn encode(&self, doc: &Document) -> Result<String> {
        let value = match self.variant {
            JsonVariant::Relaxed => Bson::Document(doc.clone()).into_relaxed_extjson(),
            JsonVariant::Canonical => Bson::Document(doc.clone()).into_canonical_extjson(),
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }

    async fn open(&mut self, sink: &mut OutputSink) -> Result<()> {
        if !self.opened {
            sink.write_all(b"[").await?;
            self.opened = true;
        }
        Ok(())
    }
}

#[async_trait]
impl FormatWriter for JsonArrayWriter {
    async fn write_batch(&mut self, sink: &mut OutputSink, docs: &[Document]) -> Result<usize> {
        self.open(sink).await?;

        for doc in docs {
            let json = self.encode(doc)?;
            if self.written > 0 {
                sink.write_all(b",\n").await?;
            } else {
                sink.write_all(b"\n").await?;
            }
            sink.write_all(json.as_bytes()).await?;
            self.written += 1;
        }

        Ok(docs.len())
    }

    async fn finalize(&mut self, sink: &mut OutputSink) -> Result<()> {
        self.open(sink).await?;
        if self.written > 0 {
            sink.write_all(b"\n").await?;
        }
        sink.write_all(b"]\n").await?;

        debug!("Finalized JSON array ({} documents)", self.written);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sink::testing::MemoryOutput;
    use mongodb::bson::{DateTime, doc};

    #[tokio::test]
    async fn test_json_writer_produces_valid_array() {
        let output = MemoryOutput::new();
        let mut sink = output.sink("out.json");
        let mut writer = JsonArrayWriter::new(JsonVariant::Relaxed);

        writer
            .write_batch(&mut sink, &[doc! { "name": "Alice", "age": 30 }])
            .await
            .unwrap();
        writer
            .write_batch(&mut sink, &[doc! { "name": "Bob", "age": 25 }])
            .await
            .unwrap();
        writer.finalize(&mut sink).await.unwrap();
        sink.close().await.unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output.contents()).unwrap();
        let items = parsed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], "Bob");
        assert_eq!(items[1]["age"], 25);
        assert_eq!(writer.written(), 2);
    }

    #[tokio::test]
    async fn test_json_writer_empty_array() {
        let output = MemoryOutput::new();
        let mut sink = output.sink("out.json");
        let mut writer = JsonArrayWriter::new(JsonVariant::Relaxed);

        writer.finalize(&mut sink).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(output.contents(), "[]\n");
    }

    #[test]
    fn test_canonical_wraps_numbers() {
        let writer = JsonArrayWriter::new(JsonVariant::Canonical);
        let json = writer.encode(&doc! { "n": 1 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["n"]["$numberInt"], "1");
    }

    #[test]
    fn test_relaxed_keeps_dates_readable() {
        let writer = JsonArrayWriter::new(JsonVariant::Relaxed);
        let json = writer
            .encode(&doc! { "at": DateTime::from_millis(0) })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["at"]["$date"], "1970-01-01T00:00:00Z");
    }
}
