//! mongo-export
//!
//! Exports the result of a find query or aggregation pipeline on one
//! MongoDB collection to a CSV or JSON file.
//!
//! # Usage
//!
//! ```bash
//! # Whole query result as JSON
//! mongo-export mongodb://localhost:27017 --ns shop.orders --filter '{"status":"paid"}'
//!
//! # Selected fields as CSV
//! mongo-export --ns shop.orders --fields name,address.city -o orders.csv
//! ```

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, warn};

use mongo_export::cli::{CliInterface, Commands, fields::render_fields_table};
use mongo_export::connection::ConnectionManager;
use mongo_export::error::{ExecutionError, Result};
use mongo_export::export::{
    DiscoveryRequest, ExportQuery, FieldDiscovery, FieldId, FileOutputOpener, MongoExportService,
    MongoFieldDiscovery, Namespace, SchemaPath, parse_document,
};
use mongo_export::notify::TerminalNotifier;
use mongo_export::telemetry::TracingTelemetry;
use mongo_export::workflow::{
    ExportController, ExportEvent, ExportServices, ExportStatus, FIELD_DISCOVERY_SAMPLE_SIZE,
    FieldsToExportOption,
};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle local subcommands, or connect and export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let mut manager = ConnectionManager::new(cli.connection_uri(), cli.config().connection.clone());
    manager.connect().await?;

    if let Ok(version) = manager.get_server_version().await {
        debug!("Server version {}", version);
    }

    let outcome = match &cli.args().command {
        Some(Commands::Fields { namespace, filter }) => {
            list_fields(&manager, namespace, filter.as_deref()).await
        }
        _ => run_export(&cli, &manager).await,
    };

    manager.disconnect().await?;
    outcome
}

/// Sample the collection and print the field paths found
async fn list_fields(
    manager: &ConnectionManager,
    namespace: &str,
    filter: Option<&str>,
) -> Result<()> {
    let namespace = Namespace::parse(namespace)?;
    let query = filter
        .map(|json| parse_document("filter", json))
        .transpose()?
        .map(ExportQuery::with_filter);

    let discovery = MongoFieldDiscovery::new(manager.get_client()?.clone());
    let result = discovery
        .discover(DiscoveryRequest {
            namespace: namespace.to_string(),
            query,
            sample_size: FIELD_DISCOVERY_SAMPLE_SIZE,
            token: CancellationToken::new(),
        })
        .await?;

    println!("{}", render_fields_table(&result.paths));
    Ok(())
}

/// Drive the export workflow from open to completion
async fn run_export(cli: &CliInterface, manager: &ConnectionManager) -> Result<()> {
    let options = cli.open_options()?;
    let (file_path, file_type) = cli.export_target();
    let client = manager.get_client()?.clone();

    let services = ExportServices {
        discovery: Arc::new(MongoFieldDiscovery::new(client.clone())),
        exporter: Arc::new(MongoExportService::new(client, cli.config().export.clone())),
        opener: Arc::new(FileOutputOpener),
        notifier: Arc::new(TerminalNotifier::new(cli.args().quiet, cli.color_enabled())),
        telemetry: Arc::new(TracingTelemetry),
    };

    let mut controller = ExportController::new(services, manager.subscribe());
    let mut finished = controller.subscribe();

    controller.dispatch(ExportEvent::Open(options)).await;

    let wanted = cli.selected_fields();
    if controller.state().status == ExportStatus::SelectFieldOptions {
        if wanted.is_empty() {
            controller
                .dispatch(ExportEvent::ReadyToExport(Some(FieldsToExportOption::AllFields)))
                .await;
        } else {
            select_fields(&mut controller, wanted).await?;
        }
    } else if !wanted.is_empty() {
        warn!("--fields is ignored for full collection exports and queries with a projection");
    }

    controller
        .dispatch(ExportEvent::RunExport {
            file_path,
            file_type,
        })
        .await;

    if let Some(error) = controller.state().export_file_error.clone() {
        return Err(ExecutionError::ExportFailed(error).into());
    }

    let handle = controller.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel_export();
        }
    });

    controller.settle_until(|state| !state.is_in_progress()).await;
    interrupt.abort();

    match finished.try_recv() {
        Ok(done) => {
            debug!("Exported {} documents as {}", done.docs_written, done.file_type);
            Ok(())
        }
        Err(_) => {
            let message = controller
                .state()
                .export_error
                .clone()
                .unwrap_or_else(|| "export did not complete".to_string());
            Err(ExecutionError::ExportFailed(message).into())
        }
    }
}

/// Discover fields, then select exactly the requested paths
async fn select_fields(
    controller: &mut ExportController,
    wanted: Vec<SchemaPath>,
) -> Result<()> {
    controller.dispatch(ExportEvent::SelectFieldsToExport).await;
    controller
        .settle_until(|state| state.discovery.is_none())
        .await;

    if let Some(error) = controller.state().error_loading_fields_to_export.clone() {
        return Err(ExecutionError::DiscoveryFailed(error).into());
    }

    let wanted_ids: BTreeSet<FieldId> = wanted.iter().map(|p| FieldId::for_path(p)).collect();

    let toggles: Vec<FieldId> = controller
        .state()
        .fields_to_export
        .iter()
        .filter(|(id, field)| field.selected != wanted_ids.contains(*id))
        .map(|(id, _)| id.clone())
        .collect();
    for id in toggles {
        controller.dispatch(ExportEvent::ToggleFieldToExport(id)).await;
    }

    for path in wanted {
        if !controller
            .state()
            .fields_to_export
            .contains_key(&FieldId::for_path(&path))
        {
            debug!("Field {} not seen in sample, adding it", path.join("."));
            controller.dispatch(ExportEvent::AddFieldToExport(path)).await;
        }
    }

    controller.dispatch(ExportEvent::ReadyToExport(None)).await;
    Ok(())
}

/// Initialize logging system based on configuration and CLI arguments
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
