//! Error handling for the export workflow.
//!
//! The crate uses a single top-level error, [`MongoExportError`], that wraps
//! the more specific kinds below. The workflow itself never lets these errors
//! escape to the dispatcher: they are turned into messages carried by events
//! at the boundary of each async operation. The CLI and the service
//! implementations use them with `?` as usual.
//!
//! # Example
//!
//! ```rust
//! use mongo_export::error::{MongoExportError, OutputError, Result};
//!
//! fn open_output(path: &str) -> Result<()> {
//!     Err(OutputError::CreateFailed {
//!         path: path.to_string(),
//!         reason: "permission denied".to_string(),
//!     }
//!     .into())
//! }
//!
//! let err: MongoExportError = open_output("/root/out.csv").unwrap_err();
//! assert!(err.to_string().contains("/root/out.csv"));
//! ```

pub mod kinds;
pub mod mongo;

pub use kinds::{
    ConfigError, ConnectionError, ExecutionError, MongoExportError, OutputError, ParseError,
    Result,
};
pub use mongo::ErrorInfo;
