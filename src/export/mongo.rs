//! MongoDB-backed discovery and export services.

use std::future::IntoFuture;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::Document;
use mongodb::{Client, Collection, Cursor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::error::{ExecutionError, Result};

use super::coordinator::ExportCoordinator;
use super::fields::SchemaPathCollector;
use super::options::{ExportQuery, ExportSource, Namespace};
use super::service::{
    DiscoveryRequest, DiscoveryResult, ExportOptions, ExportResult, ExportService, FieldDiscovery,
    ProgressCallback,
};
use super::streaming::CursorStreamingQuery;
use super::writers::JsonArrayWriter;

fn collection(client: &Client, namespace: &str) -> Result<Collection<Document>> {
    let ns = Namespace::parse(namespace)?;
    Ok(client
        .database(&ns.database)
        .collection::<Document>(&ns.collection))
}

/// Samples the current query to find field paths
#[derive(Clone)]
pub struct MongoFieldDiscovery {
    client: Client,
}

impl MongoFieldDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FieldDiscovery for MongoFieldDiscovery {
    async fn discover(&self, request: DiscoveryRequest) -> Result<DiscoveryResult> {
        let coll = collection(&self.client, &request.namespace)?;
        let query = request.query.unwrap_or_default();
        let token = request.token;

        let mut find = coll
            .find(query.filter)
            .limit(i64::from(request.sample_size));
        if let Some(sort) = query.sort {
            find = find.sort(sort);
        }
        if let Some(skip) = query.skip {
            find = find.skip(skip);
        }

        let mut collector = SchemaPathCollector::new();

        let mut cursor = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Ok(DiscoveryResult { paths: Vec::new(), aborted: true });
            }
            cursor = find.into_future() => cursor.map_err(|e| ExecutionError::DiscoveryFailed(e.to_string()))?,
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Field discovery on {} cancelled", request.namespace);
                    return Ok(DiscoveryResult { paths: collector.into_paths(), aborted: true });
                }
                next = cursor.try_next() => match next {
                    Ok(Some(doc)) => collector.add_document(&doc),
                    Ok(None) => break,
                    Err(e) => return Err(ExecutionError::DiscoveryFailed(e.to_string()).into()),
                },
            }
        }

        debug!(
            "Discovered {} field paths on {}",
            collector.len(),
            request.namespace
        );
        Ok(DiscoveryResult {
            paths: collector.into_paths(),
            aborted: false,
        })
    }
}

/// Streams find or aggregate cursors into CSV or JSON
#[derive(Clone)]
pub struct MongoExportService {
    client: Client,
    config: ExportConfig,
}

impl MongoExportService {
    pub fn new(client: Client, config: ExportConfig) -> Self {
        Self { client, config }
    }

    async fn open_cursor(&self, namespace: &str, source: &ExportSource) -> Result<Cursor<Document>> {
        let coll = collection(&self.client, namespace)?;
        let batch_size = self.config.batch_size;

        let cursor = match source {
            ExportSource::Query(query) => find_cursor(&coll, query, batch_size).await?,
            ExportSource::Aggregation(aggregation) => {
                coll.aggregate(aggregation.stages.clone())
                    .batch_size(batch_size)
                    .allow_disk_use(true)
                    .await?
            }
        };

        info!("Opened {} cursor on {}", source.kind(), namespace);
        Ok(cursor)
    }

    async fn streaming(
        &self,
        namespace: &str,
        token: CancellationToken,
        progress: ProgressCallback,
        source: &ExportSource,
    ) -> Result<ExportCoordinator<'static>> {
        let cursor = self.open_cursor(namespace, source).await?;
        let query = CursorStreamingQuery::new(cursor, self.config.batch_size, source.kind());
        Ok(ExportCoordinator::new(Box::new(query), token, progress))
    }
}

async fn find_cursor(
    coll: &Collection<Document>,
    query: &ExportQuery,
    batch_size: u32,
) -> Result<Cursor<Document>> {
    let mut find = coll.find(query.filter.clone()).batch_size(batch_size);
    if let Some(projection) = &query.projection {
        find = find.projection(projection.clone());
    }
    if let Some(sort) = &query.sort {
        find = find.sort(sort.clone());
    }
    if let Some(limit) = query.limit {
        find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = query.skip {
        find = find.skip(skip);
    }
    Ok(find.await?)
}

#[async_trait]
impl ExportService for MongoExportService {
    async fn export_csv(
        &self,
        options: ExportOptions<'_>,
        source: &ExportSource,
    ) -> Result<ExportResult> {
        let ExportOptions {
            namespace,
            token,
            progress,
            output,
        } = options;
        let coordinator = self.streaming(namespace, token, progress, source).await?;
        coordinator
            .run_csv(&self.config.scratch_dir(), self.config.csv_delimiter, output)
            .await
    }

    async fn export_json(
        &self,
        options: ExportOptions<'_>,
        source: &ExportSource,
    ) -> Result<ExportResult> {
        let ExportOptions {
            namespace,
            token,
            progress,
            output,
        } = options;
        let coordinator = self.streaming(namespace, token, progress, source).await?;
        coordinator
            .run_json(JsonArrayWriter::new(self.config.json_variant), output)
            .await
    }
}
