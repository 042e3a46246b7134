//! Export building blocks
//!
//! This module holds everything below the workflow: what to export
//! ([`options`]), field paths and projections ([`fields`]), the service
//! seams ([`service`]) with their MongoDB implementations ([`mongo`]),
//! output sinks, format writers and the progress throttle.

pub mod coordinator;
pub mod fields;
pub mod mongo;
pub mod options;
pub mod service;
pub mod sink;
pub mod streaming;
pub mod throttle;
pub mod writers;

pub use fields::{
    FieldId, FieldToExport, FieldsToExport, SchemaPath, SchemaPathCollector, fields_from_paths,
    projection_from_paths, schema_paths_from_document,
};
pub use mongo::{MongoExportService, MongoFieldDiscovery};
pub use options::{
    ExportAggregation, ExportQuery, ExportSource, FileType, Namespace, parse_document,
    parse_pipeline,
};
pub use service::{
    CsvPhase, DiscoveryRequest, DiscoveryResult, ExportOptions, ExportResult, ExportService,
    FieldDiscovery, ProgressCallback,
};
pub use sink::{FileOutputOpener, OutputOpener, OutputSink};
pub use throttle::{PROGRESS_INTERVAL, ProgressThrottle};
