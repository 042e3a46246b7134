//! mongo-export library
//!
//! Guided export of MongoDB query and aggregation results to CSV or JSON
//! files. The export dialog is a state machine ([`workflow::ExportState`])
//! driven by an [`workflow::ExportController`] that talks to MongoDB, the
//! output file, the user and telemetry through traits.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `export`: Field discovery, document streaming and file writers
//! - `notify`: User-facing progress and completion messages
//! - `telemetry`: Usage event tracking
//! - `workflow`: Export state machine and its controller
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mongo_export::config::Config;
//! use mongo_export::connection::ConnectionManager;
//! use mongo_export::export::{FileOutputOpener, FileType, MongoExportService, MongoFieldDiscovery};
//! use mongo_export::notify::TerminalNotifier;
//! use mongo_export::telemetry::TracingTelemetry;
//! use mongo_export::workflow::{
//!     ExportController, ExportEvent, ExportServices, FieldsToExportOption, OpenExportOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let mut manager = ConnectionManager::new(
//!         "mongodb://localhost:27017".to_string(),
//!         config.connection.clone(),
//!     );
//!     manager.connect().await?;
//!
//!     let client = manager.get_client()?.clone();
//!     let services = ExportServices {
//!         discovery: Arc::new(MongoFieldDiscovery::new(client.clone())),
//!         exporter: Arc::new(MongoExportService::new(client, config.export.clone())),
//!         opener: Arc::new(FileOutputOpener),
//!         notifier: Arc::new(TerminalNotifier::new(false, true)),
//!         telemetry: Arc::new(TracingTelemetry),
//!     };
//!
//!     let mut controller = ExportController::new(services, manager.subscribe());
//!     controller
//!         .dispatch(ExportEvent::Open(OpenExportOptions {
//!             namespace: "shop.orders".to_string(),
//!             ..Default::default()
//!         }))
//!         .await;
//!     controller
//!         .dispatch(ExportEvent::ReadyToExport(Some(FieldsToExportOption::AllFields)))
//!         .await;
//!     controller
//!         .dispatch(ExportEvent::RunExport {
//!             file_path: "orders.json".into(),
//!             file_type: FileType::Json,
//!         })
//!         .await;
//!     controller.settle_until(|state| !state.is_in_progress()).await;
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod notify;
pub mod telemetry;
pub mod workflow;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{MongoExportError, Result};
pub use workflow::{ExportController, ExportEvent, ExportState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
