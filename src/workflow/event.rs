//! Events driving the export workflow
//!
//! User intents and async completions share one enum so every input of the
//! transition function is matched exhaustively.

use std::path::PathBuf;

use crate::connection::ConnectionId;
use crate::export::{ExportResult, FieldId, FileType, SchemaPath};

use super::state::{FieldsToExportOption, OpenExportOptions, OperationId};

#[derive(Debug, Clone)]
pub enum ExportEvent {
    /// Show the dialog for a new export
    Open(OpenExportOptions),
    Close,
    /// The data connection went away
    DataServiceDisconnected,
    CloseInProgressMessage,

    /// Pick fields by hand; starts a field discovery
    SelectFieldsToExport,
    FieldsDiscovered {
        operation: OperationId,
        paths: Vec<SchemaPath>,
        aborted: bool,
    },
    FieldDiscoveryFailed {
        operation: OperationId,
        message: String,
        aborted: bool,
    },
    BackToSelectFieldOptions,
    BackToSelectFieldsToExport,
    ToggleFieldToExport(FieldId),
    AddFieldToExport(SchemaPath),
    ToggleExportAllSelectedFields,
    ReadyToExport(Option<FieldsToExportOption>),

    /// Request to open the output and start exporting
    RunExport {
        file_path: PathBuf,
        file_type: FileType,
    },
    /// The output could not be opened
    ExportFileError(String),
    /// The output is open and owned by the controller
    OutputOpened {
        file_path: PathBuf,
        file_type: FileType,
    },
    CancelExport,
    RunExportError {
        operation: OperationId,
        message: String,
    },
    RunExportSuccess {
        operation: OperationId,
        result: ExportResult,
        started_on: Option<ConnectionId>,
    },
}

impl ExportEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ExportEvent::Open(_) => "Open",
            ExportEvent::Close => "Close",
            ExportEvent::DataServiceDisconnected => "DataServiceDisconnected",
            ExportEvent::CloseInProgressMessage => "CloseInProgressMessage",
            ExportEvent::SelectFieldsToExport => "SelectFieldsToExport",
            ExportEvent::FieldsDiscovered { .. } => "FieldsDiscovered",
            ExportEvent::FieldDiscoveryFailed { .. } => "FieldDiscoveryFailed",
            ExportEvent::BackToSelectFieldOptions => "BackToSelectFieldOptions",
            ExportEvent::BackToSelectFieldsToExport => "BackToSelectFieldsToExport",
            ExportEvent::ToggleFieldToExport(_) => "ToggleFieldToExport",
            ExportEvent::AddFieldToExport(_) => "AddFieldToExport",
            ExportEvent::ToggleExportAllSelectedFields => "ToggleExportAllSelectedFields",
            ExportEvent::ReadyToExport(_) => "ReadyToExport",
            ExportEvent::RunExport { .. } => "RunExport",
            ExportEvent::ExportFileError(_) => "ExportFileError",
            ExportEvent::OutputOpened { .. } => "OutputOpened",
            ExportEvent::CancelExport => "CancelExport",
            ExportEvent::RunExportError { .. } => "RunExportError",
            ExportEvent::RunExportSuccess { .. } => "RunExportSuccess",
        }
    }
}
