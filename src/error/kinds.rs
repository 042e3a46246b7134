use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`MongoExportError`] as the error.
pub type Result<T> = std::result::Result<T, MongoExportError>;

/// Top-level error type for export operations.
#[derive(Debug)]
pub enum MongoExportError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// Invalid user input (namespace, JSON arguments).
    Parse(ParseError),

    /// Field discovery or export execution errors.
    Execution(ExecutionError),

    /// Output file errors.
    Output(OutputError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Not currently connected to MongoDB.
    NotConnected,

    /// Ping command failed.
    PingFailed(String),
}

/// Input parsing errors.
#[derive(Debug)]
pub enum ParseError {
    /// Namespace is not of the form `<database>.<collection>`.
    InvalidNamespace(String),

    /// Argument is not valid (Extended) JSON.
    InvalidJson { argument: String, reason: String },

    /// Query parts have the wrong shape.
    InvalidQuery(String),

    /// Aggregation pipeline has the wrong shape.
    InvalidPipeline(String),
}

/// Errors raised while sampling fields or exporting documents.
#[derive(Debug)]
pub enum ExecutionError {
    /// Field sampling failed.
    DiscoveryFailed(String),

    /// Export failed mid-stream.
    ExportFailed(String),

    /// Cursor error.
    CursorError(String),

    /// Serialization of a document failed.
    SerializationFailed(String),

    /// Operation is not valid in the current workflow state.
    InvalidOperation(String),
}

/// Output sink errors.
#[derive(Debug)]
pub enum OutputError {
    /// Output file could not be created.
    CreateFailed { path: String, reason: String },

    /// Writing to the output failed.
    WriteFailed(String),

    /// Output was already closed.
    Closed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Other configuration problem.
    Generic(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for MongoExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MongoExportError::Connection(e) => write!(f, "Connection error: {e}"),
            MongoExportError::Parse(e) => write!(f, "{e}"),
            MongoExportError::Execution(e) => write!(f, "Execution error: {e}"),
            MongoExportError::Output(e) => write!(f, "Output error: {e}"),
            MongoExportError::Config(e) => write!(f, "Configuration error: {e}"),
            MongoExportError::Io(e) => write!(f, "I/O error: {e}"),
            MongoExportError::MongoDb(e) => format_mongodb_error(f, e),
            MongoExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidNamespace(ns) => {
                write!(f, "Invalid namespace '{ns}': expected <database>.<collection>")
            }
            ParseError::InvalidJson { argument, reason } => {
                write!(f, "Invalid JSON for {argument}: {reason}")
            }
            ParseError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            ParseError::InvalidPipeline(msg) => write!(f, "Invalid pipeline: {msg}"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::DiscoveryFailed(msg) => write!(f, "Failed to sample fields: {msg}"),
            ExecutionError::ExportFailed(msg) => write!(f, "Export failed: {msg}"),
            ExecutionError::CursorError(msg) => write!(f, "Cursor error: {msg}"),
            ExecutionError::SerializationFailed(msg) => {
                write!(f, "Failed to serialize document: {msg}")
            }
            ExecutionError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::CreateFailed { path, reason } => {
                write!(f, "Failed to create {path}: {reason}")
            }
            OutputError::WriteFailed(msg) => write!(f, "Failed to write output: {msg}"),
            OutputError::Closed(path) => write!(f, "Output {path} is already closed"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MongoExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MongoExportError::Io(e) => Some(e),
            MongoExportError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ParseError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for OutputError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to MongoExportError ========================= */

impl From<io::Error> for MongoExportError {
    fn from(err: io::Error) -> Self {
        MongoExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for MongoExportError {
    fn from(err: mongodb::error::Error) -> Self {
        MongoExportError::MongoDb(err)
    }
}

impl From<ConnectionError> for MongoExportError {
    fn from(err: ConnectionError) -> Self {
        MongoExportError::Connection(err)
    }
}

impl From<ParseError> for MongoExportError {
    fn from(err: ParseError) -> Self {
        MongoExportError::Parse(err)
    }
}

impl From<ExecutionError> for MongoExportError {
    fn from(err: ExecutionError) -> Self {
        MongoExportError::Execution(err)
    }
}

impl From<OutputError> for MongoExportError {
    fn from(err: OutputError) -> Self {
        MongoExportError::Output(err)
    }
}

impl From<ConfigError> for MongoExportError {
    fn from(err: ConfigError) -> Self {
        MongoExportError::Config(err)
    }
}

impl From<bson::ser::Error> for MongoExportError {
    fn from(err: bson::ser::Error) -> Self {
        MongoExportError::Execution(ExecutionError::SerializationFailed(err.to_string()))
    }
}

impl From<bson::de::Error> for MongoExportError {
    fn from(err: bson::de::Error) -> Self {
        MongoExportError::Execution(ExecutionError::SerializationFailed(err.to_string()))
    }
}

impl From<serde_json::Error> for MongoExportError {
    fn from(err: serde_json::Error) -> Self {
        MongoExportError::Execution(ExecutionError::SerializationFailed(err.to_string()))
    }
}

impl From<String> for MongoExportError {
    fn from(msg: String) -> Self {
        MongoExportError::Generic(msg)
    }
}

impl From<&str> for MongoExportError {
    fn from(msg: &str) -> Self {
        MongoExportError::Generic(msg.to_owned())
    }
}
