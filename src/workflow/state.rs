//! Session state of the export workflow.

use std::fmt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::export::{
    ExportAggregation, ExportQuery, ExportSource, FieldsToExport, FileType, SchemaPath,
    projection_from_paths,
};

/// Identifier of one discovery or export run
///
/// Ids are never reused by a controller, so completions of superseded runs
/// can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OperationId(u64);

impl OperationId {
    pub fn get(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Step of the export dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportStatus {
    /// Closed, or finished the last run
    #[default]
    Idle,
    SelectFieldOptions,
    SelectFieldsToExport,
    ReadyToExport,
    /// Reserved for an external file picker; no event enters it
    SelectFileOutput,
    InProgress,
}

/// Whether to export every field or a picked subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldsToExportOption {
    AllFields,
    SelectFields,
}

impl FieldsToExportOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldsToExportOption::AllFields => "all-fields",
            FieldsToExportOption::SelectFields => "select-fields",
        }
    }
}

/// What to export when the dialog opens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenExportOptions {
    pub namespace: String,
    pub query: Option<ExportQuery>,
    pub aggregation: Option<ExportAggregation>,
    pub export_full_collection: bool,
}

/// A running cancellable operation
#[derive(Debug, Clone)]
pub struct LiveOperation {
    pub id: OperationId,
    pub token: CancellationToken,
}

/// The running export, with the output it writes to
#[derive(Debug, Clone)]
pub struct ActiveExport {
    pub id: OperationId,
    pub token: CancellationToken,
    pub file_path: PathBuf,
    pub file_type: FileType,
}

/// State of one export dialog
#[derive(Debug, Clone)]
pub struct ExportState {
    pub is_open: bool,
    pub status: ExportStatus,
    pub namespace: String,
    pub query: Option<ExportQuery>,
    pub aggregation: Option<ExportAggregation>,
    pub export_full_collection: bool,
    pub fields_to_export: FieldsToExport,
    pub selected_field_option: Option<FieldsToExportOption>,
    pub discovery: Option<LiveOperation>,
    pub export: Option<ActiveExport>,
    pub error_loading_fields_to_export: Option<String>,
    pub export_file_error: Option<String>,
    /// Failure message of the last export run, cleared when the next one starts
    pub export_error: Option<String>,
    pub is_in_progress_message_open: bool,
    pub(crate) next_operation: OperationId,
}

impl Default for ExportState {
    fn default() -> Self {
        Self {
            is_open: false,
            status: ExportStatus::Idle,
            namespace: String::new(),
            query: Some(ExportQuery::default()),
            aggregation: None,
            export_full_collection: false,
            fields_to_export: FieldsToExport::new(),
            selected_field_option: None,
            discovery: None,
            export: None,
            error_loading_fields_to_export: None,
            export_file_error: None,
            export_error: None,
            is_in_progress_message_open: false,
            next_operation: OperationId::default(),
        }
    }
}

impl ExportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ExportStatus::InProgress
    }

    /// Paths of the selected fields, in id order
    pub fn selected_paths(&self) -> Vec<&SchemaPath> {
        self.fields_to_export
            .values()
            .filter(|field| field.selected)
            .map(|field| &field.path)
            .collect()
    }

    /// The source an export started now would read from
    ///
    /// An aggregation wins over the query. When fields were picked, the
    /// query's projection is replaced by one built from the selection.
    pub fn effective_source(&self) -> ExportSource {
        if let Some(aggregation) = &self.aggregation {
            return ExportSource::Aggregation(aggregation.clone());
        }

        let mut query = self.query.clone().unwrap_or_default();
        if self.selected_field_option == Some(FieldsToExportOption::SelectFields) {
            query.projection = Some(projection_from_paths(self.selected_paths()));
        }
        ExportSource::Query(query)
    }

    /// `"aggregation"` or `"query"`
    pub fn source_kind(&self) -> &'static str {
        if self.aggregation.is_some() {
            "aggregation"
        } else {
            "query"
        }
    }

    pub(crate) fn allocate_operation(&mut self) -> OperationId {
        self.next_operation = self.next_operation.next();
        self.next_operation
    }

    pub(crate) fn cancel_discovery(&mut self) {
        if let Some(discovery) = self.discovery.take() {
            discovery.token.cancel();
        }
    }

    /// Cancel the live export token; the run stays tracked until it reports back
    pub(crate) fn cancel_export(&self) {
        if let Some(export) = &self.export {
            export.token.cancel();
        }
    }

    pub(crate) fn is_live_discovery(&self, operation: OperationId) -> bool {
        self.discovery.as_ref().is_some_and(|d| d.id == operation)
    }

    pub(crate) fn is_live_export(&self, operation: OperationId) -> bool {
        self.export.as_ref().is_some_and(|e| e.id == operation)
    }
}
