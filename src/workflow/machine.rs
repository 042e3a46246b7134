//! Transition table of the export workflow
//!
//! [`ExportState::apply`] is pure: it never performs I/O. Side effects are
//! returned as [`ExportCommand`]s for the controller to execute, and their
//! outcomes come back as further events.

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::ConnectionId;
use crate::export::{
    DiscoveryRequest, ExportSource, FieldId, FieldToExport, FileType, fields_from_paths,
};

use super::event::ExportEvent;
use super::state::{
    ActiveExport, ExportState, ExportStatus, FieldsToExportOption, LiveOperation,
    OpenExportOptions, OperationId,
};

/// Number of documents sampled to discover fields
pub const FIELD_DISCOVERY_SAMPLE_SIZE: u32 = 50;

/// Everything an export run needs
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub operation: OperationId,
    pub namespace: String,
    pub source: ExportSource,
    pub file_path: PathBuf,
    pub file_type: FileType,
    pub token: CancellationToken,
}

/// Side effect requested by a transition
#[derive(Debug, Clone)]
pub enum ExportCommand {
    DiscoverFields {
        operation: OperationId,
        request: DiscoveryRequest,
    },
    OpenOutput {
        file_path: PathBuf,
        file_type: FileType,
    },
    StartExport(ExportPlan),
    ShowStarting {
        namespace: String,
    },
    ShowCompleted {
        docs_written: u64,
        file_path: PathBuf,
    },
    ShowCancelled {
        docs_written: u64,
        file_path: PathBuf,
    },
    ShowFailed {
        message: String,
    },
    Track {
        event: &'static str,
        properties: Map<String, Value>,
    },
    /// Tell listeners an export finished, if the connection is unchanged
    EmitExportFinished {
        docs_written: u64,
        file_type: FileType,
        started_on: Option<ConnectionId>,
    },
}

/// New state plus the commands to run, in order
#[derive(Debug)]
pub struct Transition {
    pub state: ExportState,
    pub commands: Vec<ExportCommand>,
}

impl Transition {
    fn to(state: ExportState) -> Self {
        Self {
            state,
            commands: Vec::new(),
        }
    }

    fn with(state: ExportState, commands: Vec<ExportCommand>) -> Self {
        Self { state, commands }
    }
}

impl ExportState {
    /// Apply one event
    ///
    /// # Arguments
    /// * `event` - User intent or async completion
    ///
    /// # Returns
    /// * `Transition` - Next state and the commands it requests
    pub fn apply(mut self, event: ExportEvent) -> Transition {
        debug!("Export workflow: {} in {:?}", event.name(), self.status);

        match event {
            ExportEvent::Open(options) => self.open(options),

            ExportEvent::Close | ExportEvent::DataServiceDisconnected => {
                self.cancel_discovery();
                self.cancel_export();
                self.is_open = false;
                Transition::to(self)
            }

            ExportEvent::CloseInProgressMessage => {
                self.is_in_progress_message_open = false;
                Transition::to(self)
            }

            ExportEvent::SelectFieldsToExport => {
                self.error_loading_fields_to_export = None;
                self.selected_field_option = Some(FieldsToExportOption::SelectFields);
                self.status = ExportStatus::SelectFieldsToExport;

                self.cancel_discovery();
                let operation = self.allocate_operation();
                let token = CancellationToken::new();
                self.discovery = Some(LiveOperation {
                    id: operation,
                    token: token.clone(),
                });

                let request = DiscoveryRequest {
                    namespace: self.namespace.clone(),
                    query: self.query.clone(),
                    sample_size: FIELD_DISCOVERY_SAMPLE_SIZE,
                    token,
                };
                Transition::with(
                    self,
                    vec![ExportCommand::DiscoverFields { operation, request }],
                )
            }

            ExportEvent::FieldsDiscovered {
                operation,
                paths,
                aborted,
            } => {
                if aborted || !self.is_live_discovery(operation) {
                    debug!("Ignoring field discovery {} result", operation);
                    return Transition::to(self);
                }
                self.fields_to_export = fields_from_paths(paths);
                self.discovery = None;
                Transition::to(self)
            }

            ExportEvent::FieldDiscoveryFailed {
                operation,
                message,
                aborted,
            } => {
                if aborted || !self.is_live_discovery(operation) {
                    debug!("Ignoring field discovery {} failure", operation);
                    return Transition::to(self);
                }
                self.error_loading_fields_to_export = Some(message);
                self.discovery = None;
                Transition::to(self)
            }

            ExportEvent::BackToSelectFieldOptions => {
                self.cancel_discovery();
                self.selected_field_option = None;
                self.status = ExportStatus::SelectFieldOptions;
                Transition::to(self)
            }

            ExportEvent::BackToSelectFieldsToExport => {
                self.status = ExportStatus::SelectFieldsToExport;
                Transition::to(self)
            }

            ExportEvent::ToggleFieldToExport(id) => {
                if let Some(field) = self.fields_to_export.get_mut(&id) {
                    field.selected = !field.selected;
                }
                Transition::to(self)
            }

            ExportEvent::AddFieldToExport(path) => {
                self.fields_to_export.insert(
                    FieldId::for_path(&path),
                    FieldToExport {
                        path,
                        selected: true,
                    },
                );
                Transition::to(self)
            }

            ExportEvent::ToggleExportAllSelectedFields => {
                let all_selected = self.fields_to_export.values().all(|f| f.selected);
                for field in self.fields_to_export.values_mut() {
                    field.selected = !all_selected;
                }
                Transition::to(self)
            }

            ExportEvent::ReadyToExport(option) => {
                if option == Some(FieldsToExportOption::AllFields) {
                    self.selected_field_option = option;
                }
                self.status = ExportStatus::ReadyToExport;
                Transition::to(self)
            }

            ExportEvent::RunExport {
                file_path,
                file_type,
            } => Transition::with(
                self,
                vec![ExportCommand::OpenOutput {
                    file_path,
                    file_type,
                }],
            ),

            ExportEvent::ExportFileError(message) => {
                self.export_file_error = Some(message);
                Transition::to(self)
            }

            ExportEvent::OutputOpened {
                file_path,
                file_type,
            } => self.start_export(file_path, file_type),

            ExportEvent::CancelExport => {
                self.cancel_export();
                Transition::to(self)
            }

            ExportEvent::RunExportError { operation, message } => {
                let Some(export) = self.take_live_export(operation) else {
                    return Transition::to(self);
                };
                self.status = ExportStatus::Idle;
                self.export_error = Some(message.clone());

                let properties = self.completion_properties(export.file_type, None, false);
                Transition::with(
                    self,
                    vec![
                        ExportCommand::ShowFailed { message },
                        ExportCommand::Track {
                            event: "Export Completed",
                            properties,
                        },
                    ],
                )
            }

            ExportEvent::RunExportSuccess {
                operation,
                result,
                started_on,
            } => {
                let Some(export) = self.take_live_export(operation) else {
                    return Transition::to(self);
                };
                self.status = ExportStatus::Idle;

                let properties =
                    self.completion_properties(export.file_type, Some(result.docs_written), true);
                let notice = if result.aborted {
                    ExportCommand::ShowCancelled {
                        docs_written: result.docs_written,
                        file_path: export.file_path,
                    }
                } else {
                    ExportCommand::ShowCompleted {
                        docs_written: result.docs_written,
                        file_path: export.file_path,
                    }
                };

                Transition::with(
                    self,
                    vec![
                        ExportCommand::Track {
                            event: "Export Completed",
                            properties,
                        },
                        notice,
                        ExportCommand::EmitExportFinished {
                            docs_written: result.docs_written,
                            file_type: export.file_type,
                            started_on,
                        },
                    ],
                )
            }
        }
    }

    fn open(mut self, options: OpenExportOptions) -> Transition {
        if self.is_in_progress() {
            self.is_in_progress_message_open = true;
            return Transition::to(self);
        }

        self.cancel_discovery();

        let ready = options.aggregation.is_some()
            || options.export_full_collection
            || options.query.as_ref().is_none_or(|q| q.has_projection());

        let mut properties = Map::new();
        properties.insert(
            "type".to_string(),
            json!(if options.aggregation.is_some() {
                "aggregation"
            } else {
                "query"
            }),
        );

        let state = ExportState {
            is_open: true,
            status: if ready {
                ExportStatus::ReadyToExport
            } else {
                ExportStatus::SelectFieldOptions
            },
            namespace: options.namespace,
            query: options.query,
            aggregation: options.aggregation,
            export_full_collection: options.export_full_collection,
            next_operation: self.next_operation,
            ..ExportState::default()
        };

        Transition::with(
            state,
            vec![ExportCommand::Track {
                event: "Export Opened",
                properties,
            }],
        )
    }

    fn start_export(mut self, file_path: PathBuf, file_type: FileType) -> Transition {
        self.export_file_error = None;
        self.export_error = None;
        self.cancel_discovery();
        self.cancel_export();

        let source = self.effective_source();
        let operation = self.allocate_operation();
        let token = CancellationToken::new();
        self.export = Some(ActiveExport {
            id: operation,
            token: token.clone(),
            file_path: file_path.clone(),
            file_type,
        });
        self.is_open = false;
        self.status = ExportStatus::InProgress;

        let plan = ExportPlan {
            operation,
            namespace: self.namespace.clone(),
            source,
            file_path,
            file_type,
            token,
        };
        let namespace = self.namespace.clone();
        Transition::with(
            self,
            vec![
                ExportCommand::ShowStarting { namespace },
                ExportCommand::StartExport(plan),
            ],
        )
    }

    fn take_live_export(&mut self, operation: OperationId) -> Option<ActiveExport> {
        if self.is_live_export(operation) {
            self.export.take()
        } else {
            debug!("Ignoring completion of stale export {}", operation);
            None
        }
    }

    fn completion_properties(
        &self,
        file_type: FileType,
        docs_written: Option<u64>,
        success: bool,
    ) -> Map<String, Value> {
        let mut properties = Map::new();
        properties.insert("type".to_string(), json!(self.source_kind()));
        properties.insert("all_docs".to_string(), json!(self.export_full_collection));
        properties.insert(
            "field_option".to_string(),
            json!(self.selected_field_option.map(|o| o.as_str())),
        );
        properties.insert("file_type".to_string(), json!(file_type.extension()));
        properties.insert(
            "all_fields".to_string(),
            json!(self.selected_field_option == Some(FieldsToExportOption::AllFields)),
        );
        properties.insert("number_of_docs".to_string(), json!(docs_written));
        properties.insert("success".to_string(), json!(success));
        properties
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::export::{ExportAggregation, ExportQuery, ExportResult, SchemaPath};

    fn path(segments: &[&str]) -> SchemaPath {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn opened(options: OpenExportOptions) -> ExportState {
        ExportState::new().apply(ExportEvent::Open(options)).state
    }

    fn query_options() -> OpenExportOptions {
        OpenExportOptions {
            namespace: "db.coll".to_string(),
            query: Some(ExportQuery::default()),
            ..OpenExportOptions::default()
        }
    }

    /// Open, discover the given paths and return the state
    fn with_fields(paths: Vec<SchemaPath>) -> ExportState {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { operation, .. } = &transition.commands[0] else {
            panic!("expected a discovery command");
        };
        let operation = *operation;
        transition
            .state
            .apply(ExportEvent::FieldsDiscovered {
                operation,
                paths,
                aborted: false,
            })
            .state
    }

    fn start(state: ExportState) -> (ExportState, ExportPlan) {
        let transition = state.apply(ExportEvent::OutputOpened {
            file_path: PathBuf::from("/tmp/x.csv"),
            file_type: FileType::Csv,
        });
        let plan = transition
            .commands
            .iter()
            .find_map(|c| match c {
                ExportCommand::StartExport(plan) => Some(plan.clone()),
                _ => None,
            })
            .expect("export started");
        (transition.state, plan)
    }

    #[test]
    fn test_open_with_plain_query_asks_for_field_option() {
        let transition = ExportState::new().apply(ExportEvent::Open(query_options()));
        assert_eq!(transition.state.status, ExportStatus::SelectFieldOptions);
        assert!(transition.state.is_open);

        let ExportCommand::Track { event, properties } = &transition.commands[0] else {
            panic!("expected a track command");
        };
        assert_eq!(*event, "Export Opened");
        assert_eq!(properties["type"], "query");
    }

    #[test]
    fn test_open_goes_straight_to_ready() {
        let aggregation = OpenExportOptions {
            aggregation: Some(ExportAggregation::default()),
            ..query_options()
        };
        let full = OpenExportOptions {
            export_full_collection: true,
            ..query_options()
        };
        let no_query = OpenExportOptions {
            query: None,
            ..query_options()
        };
        let projected = OpenExportOptions {
            query: Some(ExportQuery {
                projection: Some(doc! { "a": 1 }),
                ..ExportQuery::default()
            }),
            ..query_options()
        };
        let empty_projection = OpenExportOptions {
            query: Some(ExportQuery {
                projection: Some(doc! {}),
                ..ExportQuery::default()
            }),
            ..query_options()
        };

        for options in [aggregation, full, no_query, projected] {
            assert_eq!(opened(options).status, ExportStatus::ReadyToExport);
        }
        assert_eq!(
            opened(empty_projection).status,
            ExportStatus::SelectFieldOptions
        );
    }

    #[test]
    fn test_open_while_in_progress_only_shows_message() {
        let state = with_fields(vec![path(&["a"])]);
        let (state, _) = start(state);
        let fields = state.fields_to_export.clone();

        let transition = state.apply(ExportEvent::Open(OpenExportOptions {
            namespace: "other.coll".to_string(),
            query: None,
            ..OpenExportOptions::default()
        }));

        assert!(transition.commands.is_empty());
        let state = transition.state;
        assert!(state.is_in_progress_message_open);
        assert_eq!(state.status, ExportStatus::InProgress);
        assert_eq!(state.namespace, "db.coll");
        assert_eq!(state.query, Some(ExportQuery::default()));
        assert_eq!(state.fields_to_export, fields);

        let state = state.apply(ExportEvent::CloseInProgressMessage).state;
        assert!(!state.is_in_progress_message_open);
    }

    #[test]
    fn test_reopen_keeps_operation_counter() {
        let state = with_fields(vec![]);
        let before = state.next_operation;
        let state = state.apply(ExportEvent::Open(query_options())).state;
        assert_eq!(state.next_operation, before);
    }

    #[test]
    fn test_select_fields_starts_discovery_with_sample_size() {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        assert_eq!(transition.state.status, ExportStatus::SelectFieldsToExport);
        assert_eq!(
            transition.state.selected_field_option,
            Some(FieldsToExportOption::SelectFields)
        );

        let ExportCommand::DiscoverFields { request, .. } = &transition.commands[0] else {
            panic!("expected a discovery command");
        };
        assert_eq!(request.sample_size, 50);
        assert_eq!(request.namespace, "db.coll");
        assert!(!request.token.is_cancelled());
    }

    #[test]
    fn test_second_discovery_cancels_first_and_ignores_its_result() {
        let first = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields {
            operation: first_op,
            request: first_request,
        } = first.commands[0].clone()
        else {
            panic!("expected a discovery command");
        };

        let second = first.state.apply(ExportEvent::SelectFieldsToExport);
        assert!(first_request.token.is_cancelled());

        let state = second
            .state
            .apply(ExportEvent::FieldsDiscovered {
                operation: first_op,
                paths: vec![path(&["stale"])],
                aborted: false,
            })
            .state;
        assert!(state.fields_to_export.is_empty());
        assert!(state.discovery.is_some());
    }

    #[test]
    fn test_aborted_discovery_is_discarded() {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { operation, .. } = transition.commands[0] else {
            panic!("expected a discovery command");
        };
        let state = transition
            .state
            .apply(ExportEvent::FieldsDiscovered {
                operation,
                paths: vec![path(&["a"])],
                aborted: true,
            })
            .state;
        assert!(state.fields_to_export.is_empty());
    }

    #[test]
    fn test_discovery_failure_keeps_fields() {
        let state = with_fields(vec![path(&["a"])]);
        let transition = state.apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { operation, .. } = transition.commands[0] else {
            panic!("expected a discovery command");
        };

        let state = transition
            .state
            .apply(ExportEvent::FieldDiscoveryFailed {
                operation,
                message: "boom".to_string(),
                aborted: false,
            })
            .state;
        assert_eq!(
            state.error_loading_fields_to_export.as_deref(),
            Some("boom")
        );
        assert_eq!(state.fields_to_export.len(), 1);
        assert_eq!(state.status, ExportStatus::SelectFieldsToExport);

        let state = state.apply(ExportEvent::SelectFieldsToExport).state;
        assert!(state.error_loading_fields_to_export.is_none());
    }

    #[test]
    fn test_back_to_field_options_cancels_discovery() {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { request, .. } = transition.commands[0].clone() else {
            panic!("expected a discovery command");
        };

        let state = transition
            .state
            .apply(ExportEvent::BackToSelectFieldOptions)
            .state;
        assert!(request.token.is_cancelled());
        assert_eq!(state.status, ExportStatus::SelectFieldOptions);
        assert_eq!(state.selected_field_option, None);

        let state = state.apply(ExportEvent::BackToSelectFieldsToExport).state;
        assert_eq!(state.status, ExportStatus::SelectFieldsToExport);
    }

    #[test]
    fn test_toggle_twice_restores_flag() {
        let state = with_fields(vec![path(&["a"]), path(&["b", "c"])]);
        let id = FieldId::for_path(&path(&["b", "c"]));

        let toggled = state.clone().apply(ExportEvent::ToggleFieldToExport(id.clone())).state;
        assert!(toggled.fields_to_export[&id].selected);

        let restored = toggled.apply(ExportEvent::ToggleFieldToExport(id)).state;
        assert_eq!(restored.fields_to_export, state.fields_to_export);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let state = with_fields(vec![path(&["a"])]);
        let after = state
            .clone()
            .apply(ExportEvent::ToggleFieldToExport(FieldId::for_path(&path(&[
                "zzz",
            ]))))
            .state;
        assert_eq!(after.fields_to_export, state.fields_to_export);
    }

    #[test]
    fn test_toggle_all_twice_restores_uniform_selection() {
        let state = with_fields(vec![path(&["a"]), path(&["b"]), path(&["c"])]);

        let all = state
            .clone()
            .apply(ExportEvent::ToggleExportAllSelectedFields)
            .state;
        assert!(all.fields_to_export.values().all(|f| f.selected));

        let none = all.apply(ExportEvent::ToggleExportAllSelectedFields).state;
        assert_eq!(none.fields_to_export, state.fields_to_export);
    }

    #[test]
    fn test_toggle_all_with_mixed_selection_selects_all() {
        let state = with_fields(vec![path(&["a"]), path(&["b"])]);
        let state = state
            .apply(ExportEvent::ToggleFieldToExport(FieldId::for_path(&path(&["a"]))))
            .state
            .apply(ExportEvent::ToggleExportAllSelectedFields)
            .state;
        assert!(state.fields_to_export.values().all(|f| f.selected));
    }

    #[test]
    fn test_add_field_inserts_selected() {
        let state = with_fields(vec![path(&["a"])]);
        let state = state
            .apply(ExportEvent::AddFieldToExport(path(&["x", "y"])))
            .state;
        let field = &state.fields_to_export[&FieldId::for_path(&path(&["x", "y"]))];
        assert!(field.selected);
        assert_eq!(state.fields_to_export.len(), 2);
    }

    #[test]
    fn test_ready_to_export_keeps_select_fields_unless_all_fields() {
        let state = with_fields(vec![path(&["a"])]);
        let state = state.apply(ExportEvent::ReadyToExport(None)).state;
        assert_eq!(state.status, ExportStatus::ReadyToExport);
        assert_eq!(
            state.selected_field_option,
            Some(FieldsToExportOption::SelectFields)
        );

        let state = state
            .apply(ExportEvent::ReadyToExport(Some(FieldsToExportOption::AllFields)))
            .state;
        assert_eq!(
            state.selected_field_option,
            Some(FieldsToExportOption::AllFields)
        );
    }

    #[test]
    fn test_two_of_five_selected_builds_exact_projection() {
        let mut state = with_fields(vec![
            path(&["a"]),
            path(&["b"]),
            path(&["c", "d"]),
            path(&["e"]),
            path(&["f"]),
        ]);
        for selected in [path(&["b"]), path(&["c", "d"])] {
            state = state
                .apply(ExportEvent::ToggleFieldToExport(FieldId::for_path(&selected)))
                .state;
        }
        let state = state.apply(ExportEvent::ReadyToExport(None)).state;
        let (_, plan) = start(state);

        let ExportSource::Query(query) = plan.source else {
            panic!("expected a query source");
        };
        assert_eq!(
            query.projection,
            Some(doc! { "b": 1, "c": { "d": 1 }, "_id": 0 })
        );
    }

    #[test]
    fn test_run_export_only_requests_output() {
        let state = opened(query_options());
        let transition = state.apply(ExportEvent::RunExport {
            file_path: PathBuf::from("/tmp/x.json"),
            file_type: FileType::Json,
        });
        assert!(matches!(
            transition.commands.as_slice(),
            [ExportCommand::OpenOutput { file_type: FileType::Json, .. }]
        ));
        assert_eq!(transition.state.status, ExportStatus::SelectFieldOptions);
    }

    #[test]
    fn test_file_error_recorded_then_cleared_on_start() {
        let state = opened(query_options())
            .apply(ExportEvent::ExportFileError("denied".to_string()))
            .state;
        assert_eq!(state.export_file_error.as_deref(), Some("denied"));
        assert!(state.is_open);

        let (state, _) = start(state);
        assert!(state.export_file_error.is_none());
        assert_eq!(state.status, ExportStatus::InProgress);
        assert!(!state.is_open);
    }

    #[test]
    fn test_output_opened_cancels_discovery() {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { request, .. } = transition.commands[0].clone() else {
            panic!("expected a discovery command");
        };
        let (state, _) = start(transition.state);
        assert!(request.token.is_cancelled());
        assert!(state.discovery.is_none());
    }

    #[test]
    fn test_cancel_export_keeps_run_tracked() {
        let (state, plan) = start(opened(query_options()));
        let state = state.apply(ExportEvent::CancelExport).state;
        assert!(plan.token.is_cancelled());
        assert_eq!(state.status, ExportStatus::InProgress);
        assert!(state.export.is_some());
    }

    #[test]
    fn test_success_tracks_and_notifies() {
        let (state, plan) = start(opened(query_options()));
        let transition = state.apply(ExportEvent::RunExportSuccess {
            operation: plan.operation,
            result: ExportResult {
                docs_written: 42,
                aborted: false,
            },
            started_on: None,
        });

        assert_eq!(transition.state.status, ExportStatus::Idle);
        assert!(transition.state.export.is_none());
        match transition.commands.as_slice() {
            [
                ExportCommand::Track { event, properties },
                ExportCommand::ShowCompleted { docs_written: 42, .. },
                ExportCommand::EmitExportFinished {
                    docs_written: 42,
                    file_type: FileType::Csv,
                    ..
                },
            ] => {
                assert_eq!(*event, "Export Completed");
                assert_eq!(properties["number_of_docs"], 42);
                assert_eq!(properties["success"], true);
                assert_eq!(properties["file_type"], "csv");
                assert_eq!(properties["type"], "query");
                assert_eq!(properties["field_option"], Value::Null);
            }
            other => panic!("unexpected commands: {:?}", other),
        }
    }

    #[test]
    fn test_aborted_success_shows_cancelled() {
        let (state, plan) = start(opened(query_options()));
        let transition = state.apply(ExportEvent::RunExportSuccess {
            operation: plan.operation,
            result: ExportResult {
                docs_written: 10,
                aborted: true,
            },
            started_on: None,
        });
        assert!(transition.commands.iter().any(|c| matches!(
            c,
            ExportCommand::ShowCancelled {
                docs_written: 10,
                ..
            }
        )));
        assert_eq!(transition.state.status, ExportStatus::Idle);
    }

    #[test]
    fn test_failure_shows_error_without_finished_event() {
        let (state, plan) = start(opened(query_options()));
        let transition = state.apply(ExportEvent::RunExportError {
            operation: plan.operation,
            message: "cursor died".to_string(),
        });

        assert_eq!(transition.state.status, ExportStatus::Idle);
        assert!(matches!(
            transition.commands.as_slice(),
            [ExportCommand::ShowFailed { .. }, ExportCommand::Track { .. }]
        ));
        let ExportCommand::Track { properties, .. } = &transition.commands[1] else {
            unreachable!();
        };
        assert_eq!(properties["success"], false);
        assert_eq!(properties["number_of_docs"], Value::Null);
        assert_eq!(transition.state.export_error.as_deref(), Some("cursor died"));
    }

    #[test]
    fn test_failure_message_cleared_by_next_export() {
        let (state, plan) = start(opened(query_options()));
        let state = state
            .apply(ExportEvent::RunExportError {
                operation: plan.operation,
                message: "cursor died".to_string(),
            })
            .state;

        let (state, _) = start(state);
        assert_eq!(state.export_error, None);
    }

    #[test]
    fn test_stale_failure_keeps_message_empty() {
        let (state, first) = start(opened(query_options()));
        let (state, _) = start(state);
        let state = state
            .apply(ExportEvent::RunExportError {
                operation: first.operation,
                message: "interrupted".to_string(),
            })
            .state;
        assert_eq!(state.export_error, None);
        assert!(state.is_in_progress());
    }

    #[test]
    fn test_stale_export_completion_ignored() {
        let (state, first) = start(opened(query_options()));
        let (state, second) = start(state);
        assert!(first.token.is_cancelled());

        let transition = state.apply(ExportEvent::RunExportSuccess {
            operation: first.operation,
            result: ExportResult::default(),
            started_on: None,
        });
        assert!(transition.commands.is_empty());
        assert_eq!(transition.state.status, ExportStatus::InProgress);
        assert_eq!(
            transition.state.export.as_ref().map(|e| e.id),
            Some(second.operation)
        );
    }

    #[test]
    fn test_close_cancels_everything() {
        let transition = opened(query_options()).apply(ExportEvent::SelectFieldsToExport);
        let ExportCommand::DiscoverFields { request, .. } = transition.commands[0].clone() else {
            panic!("expected a discovery command");
        };
        let state = transition.state.apply(ExportEvent::Close).state;
        assert!(request.token.is_cancelled());
        assert!(!state.is_open);
        assert_eq!(state.status, ExportStatus::SelectFieldsToExport);

        let (state, plan) = start(opened(query_options()));
        let state = state.apply(ExportEvent::DataServiceDisconnected).state;
        assert!(plan.token.is_cancelled());
        assert!(!state.is_open);
    }
}
