//! Collaborator seams for the data store and the weather provider.
//!
//! Handles are injected into the monitor at construction, so tests can swap
//! in fakes and the binary can pick a concrete backend.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::error::FetchError;
use super::model::{EntityClass, GeoPoint, RecordFilter, WeatherSeverity};

/// Point-in-time reads of one entity class at a time.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Display name for logs.
    fn name(&self) -> &str {
        "data source"
    }

    async fn fetch(&self, class: EntityClass, filter: &RecordFilter) -> Result<Vec<Value>, FetchError>;
}

/// Current conditions along a route.
#[async_trait]
pub trait WeatherService: Send + Sync + 'static {
    async fn severity(&self, route: &[GeoPoint]) -> Result<WeatherSeverity, FetchError>;
}

/// Reads `<data_dir>/<class>.json`, a JSON array of documents, on every fetch.
pub struct FileDataSource {
    data_dir: PathBuf,
}

impl FileDataSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, class: EntityClass) -> PathBuf {
        self.data_dir.join(format!("{}.json", class.as_str()))
    }
}

/// Whether a document is assigned to `email`, either directly or via a list.
fn assigned_to(doc: &Value, email: &str) -> bool {
    let field = doc
        .get("order")
        .and_then(|order| order.get("assigned_to"))
        .or_else(|| doc.get("assigned_to"));
    match field {
        Some(Value::String(s)) => s.eq_ignore_ascii_case(email),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| s.eq_ignore_ascii_case(email)),
        _ => false,
    }
}

/// Apply a record filter. A limit keeps the most recently appended documents.
pub fn apply_filter(mut docs: Vec<Value>, filter: &RecordFilter) -> Vec<Value> {
    if let Some(email) = filter.assigned_to.as_deref() {
        docs.retain(|doc| assigned_to(doc, email));
    }
    if let Some(limit) = filter.limit {
        let excess = docs.len().saturating_sub(limit);
        docs.drain(..excess);
    }
    docs
}

#[async_trait]
impl DataSource for FileDataSource {
    fn name(&self) -> &str {
        "file data source"
    }

    async fn fetch(&self, class: EntityClass, filter: &RecordFilter) -> Result<Vec<Value>, FetchError> {
        let path = self.path_for(class);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::transient(self.name(), format!("{}: {e}", path.display())))?;
        let docs: Vec<Value> = serde_json::from_str(&content)?;
        Ok(apply_filter(docs, filter))
    }
}
