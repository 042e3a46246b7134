//! Workflow controller
//!
//! [`ExportController`] owns the [`ExportState`] and is the only place it is
//! mutated. Intents are dispatched on it directly or through an
//! [`ExportHandle`]; discovery and export runs execute as spawned tasks that
//! report back on the controller's event channel. A transition of the
//! connection signal to `None` is fed in as `DataServiceDisconnected`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionId, ConnectionWatch};
use crate::error::Result;
use crate::export::{
    CsvPhase, ExportOptions, ExportResult, ExportService, FieldDiscovery, FileType, OutputOpener,
    OutputSink, PROGRESS_INTERVAL, ProgressCallback, ProgressThrottle,
};
use crate::notify::{ExportNotifier, ExportProgress};
use crate::telemetry::Telemetry;

use super::event::ExportEvent;
use super::machine::{ExportCommand, ExportPlan};
use super::state::{ExportState, OperationId};

/// Capacity of the completion broadcast
const FINISHED_CHANNEL_CAPACITY: usize = 16;

/// Collaborators the controller runs commands against
#[derive(Clone)]
pub struct ExportServices {
    pub discovery: Arc<dyn FieldDiscovery>,
    pub exporter: Arc<dyn ExportService>,
    pub opener: Arc<dyn OutputOpener>,
    pub notifier: Arc<dyn ExportNotifier>,
    pub telemetry: Arc<dyn Telemetry>,
}

/// Cloneable sender of workflow events
#[derive(Debug, Clone)]
pub struct ExportHandle {
    events: mpsc::UnboundedSender<ExportEvent>,
}

impl ExportHandle {
    /// Queue an event for the controller
    ///
    /// # Returns
    /// * `bool` - `false` if the controller is gone
    pub fn dispatch(&self, event: ExportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn cancel_export(&self) {
        if !self.dispatch(ExportEvent::CancelExport) {
            debug!("Cancel requested after the export controller was dropped");
        }
    }
}

/// Broadcast when an export run finishes on an unchanged connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFinished {
    pub docs_written: u64,
    pub file_type: FileType,
}

/// Owner of one export workflow
pub struct ExportController {
    state: ExportState,
    services: ExportServices,
    events_tx: mpsc::UnboundedSender<ExportEvent>,
    events_rx: mpsc::UnboundedReceiver<ExportEvent>,
    connection: ConnectionWatch,
    watching_connection: bool,
    finished: broadcast::Sender<ExportFinished>,
    pending_output: Option<OutputSink>,
}

impl ExportController {
    /// Create a controller
    ///
    /// # Arguments
    /// * `services` - Discovery, export, output, notification and telemetry
    /// * `connection` - Signal carrying the current connection id
    pub fn new(services: ExportServices, connection: ConnectionWatch) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (finished, _) = broadcast::channel(FINISHED_CHANNEL_CAPACITY);

        Self {
            state: ExportState::new(),
            services,
            events_tx,
            events_rx,
            connection,
            watching_connection: true,
            finished,
            pending_output: None,
        }
    }

    pub fn state(&self) -> &ExportState {
        &self.state
    }

    pub fn handle(&self) -> ExportHandle {
        ExportHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Subscribe to completed exports
    pub fn subscribe(&self) -> broadcast::Receiver<ExportFinished> {
        self.finished.subscribe()
    }

    /// Apply an event and run the commands it produces
    ///
    /// Commands that complete inline (opening the output) feed their result
    /// back before this returns. Spawned work reports later through the
    /// event channel; see [`ExportController::process_next`].
    pub async fn dispatch(&mut self, event: ExportEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let transition = std::mem::take(&mut self.state).apply(event);
            self.state = transition.state;

            for command in transition.commands {
                if let Some(follow_up) = self.execute(command).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    /// Wait for the next queued event or connection drop and dispatch it
    ///
    /// # Returns
    /// * `bool` - `false` once no more events can arrive
    pub async fn process_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.dispatch(event).await;
                true
            }
            None => false,
        }
    }

    /// Process events until `done` holds for the state
    pub async fn settle_until(&mut self, mut done: impl FnMut(&ExportState) -> bool) {
        while !done(&self.state) {
            if !self.process_next().await {
                break;
            }
        }
    }

    async fn next_event(&mut self) -> Option<ExportEvent> {
        loop {
            tokio::select! {
                event = self.events_rx.recv() => return event,
                changed = self.connection.changed(), if self.watching_connection => {
                    match changed {
                        Ok(()) => {
                            if self.connection.borrow_and_update().is_none() {
                                info!("Connection dropped, closing export workflow");
                                return Some(ExportEvent::DataServiceDisconnected);
                            }
                        }
                        Err(_) => {
                            debug!("Connection signal closed");
                            self.watching_connection = false;
                        }
                    }
                }
            }
        }
    }

    fn current_connection(&self) -> Option<ConnectionId> {
        *self.connection.borrow()
    }

    async fn execute(&mut self, command: ExportCommand) -> Option<ExportEvent> {
        match command {
            ExportCommand::DiscoverFields { operation, request } => {
                let discovery = self.services.discovery.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let token = request.token.clone();
                    let event = match discovery.discover(request).await {
                        Ok(result) => ExportEvent::FieldsDiscovered {
                            operation,
                            paths: result.paths,
                            aborted: result.aborted || token.is_cancelled(),
                        },
                        Err(e) => {
                            error!("Failed to gather fields for export: {}", e);
                            ExportEvent::FieldDiscoveryFailed {
                                operation,
                                message: e.to_string(),
                                aborted: token.is_cancelled(),
                            }
                        }
                    };
                    let _ = events.send(event);
                });
                None
            }

            ExportCommand::OpenOutput {
                file_path,
                file_type,
            } => match self.services.opener.open(&file_path).await {
                Ok(sink) => {
                    if let Some(mut stale) = self.pending_output.replace(sink) {
                        if let Err(e) = stale.close().await {
                            warn!("Failed to close unused output: {}", e);
                        }
                    }
                    Some(ExportEvent::OutputOpened {
                        file_path,
                        file_type,
                    })
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", file_path.display(), e);
                    Some(ExportEvent::ExportFileError(e.to_string()))
                }
            },

            ExportCommand::StartExport(plan) => {
                let Some(sink) = self.pending_output.take() else {
                    return Some(ExportEvent::RunExportError {
                        operation: plan.operation,
                        message: "output is not open".to_string(),
                    });
                };

                info!(
                    "Start export of {} ({}) to {}",
                    plan.namespace,
                    plan.source.kind(),
                    plan.file_path.display()
                );

                let run = ExportRun {
                    exporter: self.services.exporter.clone(),
                    notifier: self.services.notifier.clone(),
                    handle: self.handle(),
                    started_on: self.current_connection(),
                };
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = run.execute(plan, sink).await;
                    let _ = events.send(event);
                });
                None
            }

            ExportCommand::ShowStarting { namespace } => {
                self.services
                    .notifier
                    .show_starting(&namespace, &self.handle());
                None
            }

            ExportCommand::ShowCompleted {
                docs_written,
                file_path,
            } => {
                self.services
                    .notifier
                    .show_completed(docs_written, &file_path);
                None
            }

            ExportCommand::ShowCancelled {
                docs_written,
                file_path,
            } => {
                self.services
                    .notifier
                    .show_cancelled(docs_written, &file_path);
                None
            }

            ExportCommand::ShowFailed { message } => {
                self.services.notifier.show_failed(&message);
                None
            }

            ExportCommand::Track { event, properties } => {
                self.services.telemetry.track(event, properties);
                None
            }

            ExportCommand::EmitExportFinished {
                docs_written,
                file_type,
                started_on,
            } => {
                if started_on.is_some() && started_on == self.current_connection() {
                    // No subscribers is not an error.
                    let _ = self.finished.send(ExportFinished {
                        docs_written,
                        file_type,
                    });
                } else {
                    debug!("Connection changed during export, not broadcasting completion");
                }
                None
            }
        }
    }
}

/// Everything a spawned export task needs besides the plan and the sink
struct ExportRun {
    exporter: Arc<dyn ExportService>,
    notifier: Arc<dyn ExportNotifier>,
    handle: ExportHandle,
    started_on: Option<ConnectionId>,
}

impl ExportRun {
    /// Run the export and close the sink, whatever the outcome
    async fn execute(self, plan: ExportPlan, mut sink: OutputSink) -> ExportEvent {
        let throttle = Arc::new(progress_throttle(
            self.notifier.clone(),
            self.handle.clone(),
            plan.file_path.clone(),
            plan.file_type,
        ));
        let progress: ProgressCallback = {
            let throttle = throttle.clone();
            Arc::new(move |docs_written, phase| throttle.call(docs_written, phase))
        };

        let options = ExportOptions {
            namespace: &plan.namespace,
            token: plan.token.clone(),
            progress,
            output: &mut sink,
        };
        let outcome = match plan.file_type {
            FileType::Csv => self.exporter.export_csv(options, &plan.source).await,
            FileType::Json => self.exporter.export_json(options, &plan.source).await,
        };

        if outcome.is_ok() {
            throttle.flush();
        } else {
            throttle.discard();
        }

        let closed = sink.close().await;
        self.finish(plan.operation, &plan.namespace, outcome, closed)
    }

    fn finish(
        self,
        operation: OperationId,
        namespace: &str,
        outcome: Result<ExportResult>,
        closed: Result<bool>,
    ) -> ExportEvent {
        match (outcome, closed) {
            (Ok(result), Ok(_)) => {
                info!(
                    "Finished export of {}: {} documents{}",
                    namespace,
                    result.docs_written,
                    if result.aborted { " (aborted)" } else { "" }
                );
                ExportEvent::RunExportSuccess {
                    operation,
                    result,
                    started_on: self.started_on,
                }
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                error!("Export of {} failed: {}", namespace, e);
                ExportEvent::RunExportError {
                    operation,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Throttled progress notices for one run
fn progress_throttle(
    notifier: Arc<dyn ExportNotifier>,
    handle: ExportHandle,
    file_path: PathBuf,
    file_type: FileType,
) -> ProgressThrottle<impl Fn(u64, Option<CsvPhase>) + Send + Sync + 'static> {
    ProgressThrottle::new(PROGRESS_INTERVAL, move |docs_written, csv_phase| {
        notifier.show_in_progress(
            &ExportProgress {
                file_path: file_path.clone(),
                file_type,
                docs_written,
                csv_phase,
            },
            &handle,
        );
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::watch;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::{ExecutionError, OutputError};
    use crate::export::sink::testing::MemoryOutput;
    use crate::export::{
        DiscoveryRequest, DiscoveryResult, ExportQuery, ExportSource, FieldId, SchemaPath,
    };
    use crate::notify::testing::{Notice, RecordingNotifier};
    use crate::telemetry::testing::RecordingTelemetry;
    use crate::workflow::{ExportStatus, FieldsToExportOption, OpenExportOptions};

    fn path(segments: &[&str]) -> SchemaPath {
        segments.iter().map(|s| s.to_string()).collect()
    }

    /// Discovery that answers with fixed paths, or blocks until cancelled
    #[derive(Default)]
    struct MockDiscovery {
        paths: Vec<SchemaPath>,
        block: bool,
        requests: Mutex<Vec<DiscoveryRequest>>,
    }

    #[async_trait]
    impl FieldDiscovery for MockDiscovery {
        async fn discover(&self, request: DiscoveryRequest) -> Result<DiscoveryResult> {
            self.requests.lock().unwrap().push(request.clone());
            if self.block {
                request.token.cancelled().await;
                return Ok(DiscoveryResult {
                    paths: Vec::new(),
                    aborted: true,
                });
            }
            Ok(DiscoveryResult {
                paths: self.paths.clone(),
                aborted: false,
            })
        }
    }

    /// Writes one line per document; can pause for a cancel or fail
    #[derive(Default)]
    struct MockExporter {
        docs: u64,
        pause_at: Option<u64>,
        fail: bool,
        sources: Mutex<Vec<ExportSource>>,
    }

    impl MockExporter {
        async fn run(&self, options: ExportOptions<'_>, source: &ExportSource) -> Result<ExportResult> {
            self.sources.lock().unwrap().push(source.clone());
            if self.fail {
                return Err(ExecutionError::CursorError("cursor killed".to_string()).into());
            }

            for written in 1..=self.docs {
                options.output.write_all(b"doc\n").await?;
                (options.progress)(written, None);

                if self.pause_at == Some(written) {
                    options.token.cancelled().await;
                    return Ok(ExportResult {
                        docs_written: written,
                        aborted: true,
                    });
                }
            }

            Ok(ExportResult {
                docs_written: self.docs,
                aborted: false,
            })
        }
    }

    #[async_trait]
    impl ExportService for MockExporter {
        async fn export_csv(
            &self,
            options: ExportOptions<'_>,
            source: &ExportSource,
        ) -> Result<ExportResult> {
            self.run(options, source).await
        }

        async fn export_json(
            &self,
            options: ExportOptions<'_>,
            source: &ExportSource,
        ) -> Result<ExportResult> {
            self.run(options, source).await
        }
    }

    /// Hands out in-memory sinks, or refuses
    #[derive(Default)]
    struct MockOpener {
        output: MemoryOutput,
        refuse: bool,
    }

    #[async_trait]
    impl OutputOpener for MockOpener {
        async fn open(&self, path: &Path) -> Result<OutputSink> {
            if self.refuse {
                return Err(OutputError::CreateFailed {
                    path: path.display().to_string(),
                    reason: "permission denied".to_string(),
                }
                .into());
            }
            Ok(self.output.sink(&path.display().to_string()))
        }
    }

    struct Harness {
        controller: ExportController,
        notifier: RecordingNotifier,
        telemetry: RecordingTelemetry,
        output: MemoryOutput,
        exporter: Arc<MockExporter>,
        discovery: Arc<MockDiscovery>,
        connection: watch::Sender<Option<ConnectionId>>,
    }

    fn harness(discovery: MockDiscovery, exporter: MockExporter, opener: MockOpener) -> Harness {
        let notifier = RecordingNotifier::new();
        let telemetry = RecordingTelemetry::new();
        let output = opener.output.clone();
        let discovery = Arc::new(discovery);
        let exporter = Arc::new(exporter);
        let (connection, watch) = watch::channel(Some(ConnectionId::from_raw(1)));

        let services = ExportServices {
            discovery: discovery.clone(),
            exporter: exporter.clone(),
            opener: Arc::new(opener),
            notifier: Arc::new(notifier.clone()),
            telemetry: Arc::new(telemetry.clone()),
        };

        Harness {
            controller: ExportController::new(services, watch),
            notifier,
            telemetry,
            output,
            exporter,
            discovery,
            connection,
        }
    }

    fn open_options() -> OpenExportOptions {
        OpenExportOptions {
            namespace: "db.coll".to_string(),
            query: Some(ExportQuery::default()),
            ..OpenExportOptions::default()
        }
    }

    fn run_csv() -> ExportEvent {
        ExportEvent::RunExport {
            file_path: PathBuf::from("/tmp/x.csv"),
            file_type: FileType::Csv,
        }
    }

    async fn run_to_idle(controller: &mut ExportController) {
        controller.dispatch(run_csv()).await;
        controller
            .settle_until(|state| state.status == ExportStatus::Idle)
            .await;
    }

    #[tokio::test]
    async fn test_select_fields_scenario_completes_with_42_documents() {
        let mut h = harness(
            MockDiscovery {
                paths: vec![path(&["a"]), path(&["b"]), path(&["c", "d"])],
                ..MockDiscovery::default()
            },
            MockExporter {
                docs: 42,
                ..MockExporter::default()
            },
            MockOpener::default(),
        );
        let mut finished = h.controller.subscribe();

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        assert_eq!(h.controller.state().status, ExportStatus::SelectFieldOptions);

        h.controller.dispatch(ExportEvent::SelectFieldsToExport).await;
        assert_eq!(
            h.controller.state().status,
            ExportStatus::SelectFieldsToExport
        );
        h.controller
            .settle_until(|state| state.fields_to_export.len() == 3)
            .await;
        assert_eq!(h.discovery.requests.lock().unwrap()[0].sample_size, 50);
        assert!(h
            .controller
            .state()
            .fields_to_export
            .values()
            .all(|f| !f.selected));

        h.controller
            .dispatch(ExportEvent::ToggleFieldToExport(FieldId::for_path(&path(&[
                "b",
            ]))))
            .await;
        h.controller.dispatch(ExportEvent::ReadyToExport(None)).await;
        assert_eq!(h.controller.state().status, ExportStatus::ReadyToExport);
        assert_eq!(
            h.controller.state().selected_field_option,
            Some(FieldsToExportOption::SelectFields)
        );

        h.controller.dispatch(run_csv()).await;
        assert_eq!(h.controller.state().status, ExportStatus::InProgress);
        assert!(!h.controller.state().is_open);

        h.controller
            .settle_until(|state| state.status == ExportStatus::Idle)
            .await;

        let notices = h.notifier.notices();
        assert_eq!(notices[0], Notice::Starting("db.coll".to_string()));
        assert!(notices.contains(&Notice::InProgress(42)));
        assert_eq!(
            notices.last(),
            Some(&Notice::Completed(42, PathBuf::from("/tmp/x.csv")))
        );

        let sources = h.exporter.sources.lock().unwrap();
        let ExportSource::Query(query) = &sources[0] else {
            panic!("expected a query source");
        };
        assert_eq!(query.projection, Some(bson::doc! { "b": 1, "_id": 0 }));

        assert_eq!(h.output.shutdowns(), 1);
        assert_eq!(h.output.contents().lines().count(), 42);

        let event = assert_ok!(finished.try_recv());
        assert_eq!(
            event,
            ExportFinished {
                docs_written: 42,
                file_type: FileType::Csv
            }
        );

        let completed = h.telemetry.named("Export Completed");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0]["field_option"], "select-fields");
        assert_eq!(completed[0]["number_of_docs"], 42);
        assert_eq!(h.telemetry.named("Export Opened").len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_in_progress_shows_cancelled_with_10_documents() {
        let mut h = harness(
            MockDiscovery::default(),
            MockExporter {
                docs: 100,
                pause_at: Some(10),
                ..MockExporter::default()
            },
            MockOpener::default(),
        );
        let mut finished = h.controller.subscribe();

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        h.controller.dispatch(run_csv()).await;
        h.controller.handle().cancel_export();
        h.controller
            .settle_until(|state| state.status == ExportStatus::Idle)
            .await;

        assert_eq!(
            h.notifier.notices().last(),
            Some(&Notice::Cancelled(10, PathBuf::from("/tmp/x.csv")))
        );
        assert_eq!(h.output.shutdowns(), 1);
        assert!(h.controller.state().export.is_none());

        // The connection did not change, so listeners still hear about it.
        let event = assert_ok!(finished.try_recv());
        assert_eq!(event.docs_written, 10);
    }

    #[tokio::test]
    async fn test_failure_closes_sink_and_skips_broadcast() {
        let mut h = harness(
            MockDiscovery::default(),
            MockExporter {
                fail: true,
                ..MockExporter::default()
            },
            MockOpener::default(),
        );
        let mut finished = h.controller.subscribe();

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        run_to_idle(&mut h.controller).await;

        assert_eq!(h.output.shutdowns(), 1);
        assert!(matches!(
            h.notifier.notices().last(),
            Some(Notice::Failed(message)) if message.contains("cursor killed")
        ));
        assert_err!(finished.try_recv());
        assert!(
            h.controller
                .state()
                .export_error
                .as_deref()
                .is_some_and(|message| message.contains("cursor killed"))
        );

        let completed = h.telemetry.named("Export Completed");
        assert_eq!(completed[0]["success"], false);
    }

    #[tokio::test]
    async fn test_open_failure_records_error_and_stays() {
        let mut h = harness(
            MockDiscovery::default(),
            MockExporter::default(),
            MockOpener {
                refuse: true,
                ..MockOpener::default()
            },
        );

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        h.controller.dispatch(run_csv()).await;

        let state = h.controller.state();
        assert_eq!(state.status, ExportStatus::SelectFieldOptions);
        assert!(state.is_open);
        assert!(state
            .export_file_error
            .as_deref()
            .is_some_and(|e| e.contains("permission denied")));
        assert!(h.notifier.notices().is_empty());
        assert_eq!(h.output.shutdowns(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_discovery_and_closes() {
        let mut h = harness(
            MockDiscovery {
                block: true,
                ..MockDiscovery::default()
            },
            MockExporter::default(),
            MockOpener::default(),
        );

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        h.controller.dispatch(ExportEvent::SelectFieldsToExport).await;
        let token = h
            .controller
            .state()
            .discovery
            .as_ref()
            .map(|discovery| discovery.token.clone())
            .unwrap();
        assert!(!token.is_cancelled());

        h.connection.send_replace(None);
        h.controller.settle_until(|state| !state.is_open).await;

        assert!(token.is_cancelled());
        assert_eq!(
            h.controller.state().status,
            ExportStatus::SelectFieldsToExport
        );
    }

    #[tokio::test]
    async fn test_connection_change_suppresses_broadcast_only() {
        let mut h = harness(
            MockDiscovery::default(),
            MockExporter {
                docs: 3,
                pause_at: Some(3),
                ..MockExporter::default()
            },
            MockOpener::default(),
        );
        let mut finished = h.controller.subscribe();

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        h.controller.dispatch(run_csv()).await;
        h.connection.send_replace(Some(ConnectionId::from_raw(2)));
        h.controller.handle().cancel_export();
        h.controller
            .settle_until(|state| state.status == ExportStatus::Idle)
            .await;

        assert_eq!(
            h.notifier.notices().last(),
            Some(&Notice::Cancelled(3, PathBuf::from("/tmp/x.csv")))
        );
        assert_err!(finished.try_recv());
    }

    #[tokio::test]
    async fn test_completed_run_closes_sink_once() {
        let mut h = harness(
            MockDiscovery::default(),
            MockExporter {
                docs: 5,
                ..MockExporter::default()
            },
            MockOpener::default(),
        );

        h.controller
            .dispatch(ExportEvent::Open(open_options()))
            .await;
        run_to_idle(&mut h.controller).await;

        assert_eq!(h.output.shutdowns(), 1);
        assert_eq!(
            h.notifier.notices().last(),
            Some(&Notice::Completed(5, PathBuf::from("/tmp/x.csv")))
        );
    }
}
