//! What to export: namespace, document source and output format.

use std::fmt;
use std::str::FromStr;

use bson::{Bson, Document, doc};

use crate::error::{ParseError, Result};

/// A `<database>.<collection>` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    /// Parse `db.coll`; the collection part may itself contain dots.
    pub fn parse(ns: &str) -> Result<Self> {
        match ns.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    database: database.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => Err(ParseError::InvalidNamespace(ns.to_string()).into()),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A find-style query
#[derive(Debug, Clone, PartialEq)]
pub struct ExportQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl Default for ExportQuery {
    fn default() -> Self {
        Self {
            filter: doc! {},
            projection: None,
            sort: None,
            limit: None,
            skip: None,
        }
    }
}

impl ExportQuery {
    /// Query with only a filter
    pub fn with_filter(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Whether the query already narrows the exported fields
    pub fn has_projection(&self) -> bool {
        self.projection.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// An aggregation pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportAggregation {
    pub stages: Vec<Document>,
}

/// Where exported documents come from
#[derive(Debug, Clone, PartialEq)]
pub enum ExportSource {
    Query(ExportQuery),
    Aggregation(ExportAggregation),
}

impl ExportSource {
    /// `"aggregation"` or `"query"`, as reported to telemetry
    pub fn kind(&self) -> &'static str {
        match self {
            ExportSource::Query(_) => "query",
            ExportSource::Aggregation(_) => "aggregation",
        }
    }
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Csv,
    Json,
}

impl FileType {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Json => "json",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileType::Csv),
            "json" => Ok(FileType::Json),
            other => Err(format!("unknown file type '{other}' (expected csv or json)")),
        }
    }
}

/// Parse an Extended JSON object into a document
///
/// # Arguments
/// * `argument` - Name of the argument, used in error messages
/// * `json` - Extended JSON text
pub fn parse_document(argument: &str, json: &str) -> Result<Document> {
    match parse_bson(argument, json)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(ParseError::InvalidQuery(format!(
            "{argument} must be a JSON object, got {:?}",
            other.element_type()
        ))
        .into()),
    }
}

/// Parse an Extended JSON array of stage documents
pub fn parse_pipeline(json: &str) -> Result<Vec<Document>> {
    let Bson::Array(stages) = parse_bson("pipeline", json)? else {
        return Err(ParseError::InvalidPipeline("pipeline must be a JSON array".to_string()).into());
    };

    stages
        .into_iter()
        .enumerate()
        .map(|(index, stage)| match stage {
            Bson::Document(doc) if doc.len() == 1 => Ok(doc),
            _ => Err(ParseError::InvalidPipeline(format!(
                "stage {index} must be an object with exactly one operator"
            ))
            .into()),
        })
        .collect()
}

fn parse_bson(argument: &str, json: &str) -> Result<Bson> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ParseError::InvalidJson {
            argument: argument.to_string(),
            reason: e.to_string(),
        })?;

    Bson::try_from(value).map_err(|e| {
        ParseError::InvalidJson {
            argument: argument.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
