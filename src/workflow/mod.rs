//! Export workflow
//!
//! A multi-step flow (pick field option, pick fields, review, run, then
//! complete, cancel or fail) modelled as a pure transition table
//! ([`ExportState::apply`]) driven by an [`ExportController`] that executes
//! the returned commands.

pub mod controller;
pub mod event;
pub mod machine;
pub mod state;

pub use controller::{ExportController, ExportFinished, ExportHandle, ExportServices};
pub use event::ExportEvent;
pub use machine::{ExportCommand, ExportPlan, FIELD_DISCOVERY_SAMPLE_SIZE, Transition};
pub use state::{
    ActiveExport, ExportState, ExportStatus, FieldsToExportOption, LiveOperation,
    OpenExportOptions, OperationId,
};
