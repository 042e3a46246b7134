//! Field paths, their stable ids, and projections built from them.

use std::collections::{BTreeMap, HashSet};

use bson::{Bson, Document};

/// Key segments leading to one field, e.g. `["address", "city"]`
pub type SchemaPath = Vec<String>;

/// Stable identifier of a field path
///
/// The id is the compact JSON encoding of the segments, so the same path
/// always yields the same id and paths containing dots stay distinct from
/// nested paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(String);

impl FieldId {
    /// Id for a schema path
    pub fn for_path(path: &[String]) -> Self {
        // Serializing a slice of strings cannot fail.
        Self(serde_json::to_string(path).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One candidate field and whether it is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldToExport {
    pub path: SchemaPath,
    pub selected: bool,
}

/// Candidate fields keyed by id
pub type FieldsToExport = BTreeMap<FieldId, FieldToExport>;

/// Build the field map for freshly discovered paths, all unselected
pub fn fields_from_paths<I>(paths: I) -> FieldsToExport
where
    I: IntoIterator<Item = SchemaPath>,
{
    paths
        .into_iter()
        .map(|path| {
            (
                FieldId::for_path(&path),
                FieldToExport {
                    path,
                    selected: false,
                },
            )
        })
        .collect()
}

/// Build an inclusion projection from field paths
///
/// Paths are nested (`["a", "b"]` becomes `{ a: { b: 1 } }`). `_id` is
/// excluded unless it was selected, because the server includes it by default.
pub fn projection_from_paths<'a, I>(paths: I) -> Document
where
    I: IntoIterator<Item = &'a SchemaPath>,
{
    let mut projection = Document::new();

    for path in paths {
        include_path(&mut projection, path);
    }

    if !projection.contains_key("_id") {
        projection.insert("_id", 0);
    }

    projection
}

fn include_path(projection: &mut Document, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        projection.insert(first.clone(), 1);
        return;
    }

    match projection.get_mut(first) {
        Some(Bson::Document(child)) => include_path(child, rest),
        // A parent is already fully included.
        Some(_) => {}
        None => {
            let mut child = Document::new();
            include_path(&mut child, rest);
            projection.insert(first.clone(), child);
        }
    }
}

/// Collect the field paths present in a document
///
/// Sub-documents are descended into; any other value, arrays included, ends
/// a path.
pub fn schema_paths_from_document(doc: &Document) -> Vec<SchemaPath> {
    let mut paths = Vec::new();
    collect_paths(doc, &mut Vec::new(), &mut paths);
    paths
}

fn collect_paths(doc: &Document, prefix: &mut Vec<String>, out: &mut Vec<SchemaPath>) {
    for (key, value) in doc {
        prefix.push(key.clone());
        match value {
            Bson::Document(child) if !child.is_empty() => collect_paths(child, prefix, out),
            _ => out.push(prefix.clone()),
        }
        prefix.pop();
    }
}

/// Accumulates schema paths over many documents, keeping first-seen order
#[derive(Debug, Default)]
pub struct SchemaPathCollector {
    seen: HashSet<SchemaPath>,
    paths: Vec<SchemaPath>,
}

impl SchemaPathCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the paths of one document
    pub fn add_document(&mut self, doc: &Document) {
        for path in schema_paths_from_document(doc) {
            if self.seen.insert(path.clone()) {
                self.paths.push(path);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_paths(self) -> Vec<SchemaPath> {
        self.paths
    }
}
