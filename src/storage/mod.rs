// Storage collaborator interface
//
// The authorization core never queries storage itself; built-in handlers
// and the `observe` real-time handler go through this trait.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::realtime::ConnectionHandle;

pub use memory::MemoryStorage;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("record '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Equality filter plus paging for `read_many` and `observe`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: BTreeMap<String, String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl Query {
    /// Build from request query parameters. `$limit` and `$cursor` page the
    /// result; every other key is an equality filter.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, StorageError> {
        let mut query = Query::default();
        for (key, value) in params {
            match key.as_str() {
                "$limit" => {
                    let limit = value
                        .parse::<usize>()
                        .map_err(|_| StorageError::InvalidQuery(format!("$limit must be a number, got '{}'", value)))?;
                    query.limit = Some(limit);
                }
                "$cursor" => query.cursor = Some(value.clone()),
                _ => {
                    query.filter.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(query)
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.filter.iter().all(|(key, expected)| match record.get(key) {
            Some(Value::String(actual)) => actual == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        })
    }
}

/// One page of `read_many` results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub documents: Vec<Value>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Patched,
    Removed,
}

/// A committed write, published to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub collection: String,
    pub record: Value,
}

pub type ChangeCallback = Arc<dyn Fn(&Change) + Send + Sync>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create(&self, collection: &str, data: Value) -> Result<Value, StorageError>;

    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;

    async fn read_many(&self, collection: &str, query: &Query) -> Result<Page, StorageError>;

    /// Replace a record; missing records are an error
    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, StorageError>;

    /// Merge top-level keys into a record; `None` when it does not exist
    async fn patch(&self, collection: &str, id: &str, data: Value) -> Result<Option<Value>, StorageError>;

    async fn remove(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;

    /// Deliver matching changes to `on_change` until the connection closes
    async fn observe(
        &self,
        collection: &str,
        query: Query,
        connection: ConnectionHandle,
        on_change: ChangeCallback,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_params_split_paging_from_filter() {
        let params: HashMap<String, String> = [
            ("$limit".to_string(), "5".to_string()),
            ("status".to_string(), "open".to_string()),
        ]
        .into_iter()
        .collect();

        let query = Query::from_params(&params).unwrap();
        assert_eq!(query.limit, Some(5));
        assert!(query.matches(&json!({"status": "open", "title": "x"})));
        assert!(!query.matches(&json!({"status": "done"})));
    }

    #[test]
    fn non_string_fields_compare_by_text() {
        let params: HashMap<String, String> = [("done".to_string(), "true".to_string())].into_iter().collect();
        let query = Query::from_params(&params).unwrap();
        assert!(query.matches(&json!({"done": true})));
    }

    #[test]
    fn bad_limit_is_rejected() {
        let params: HashMap<String, String> = [("$limit".to_string(), "many".to_string())].into_iter().collect();
        assert!(matches!(Query::from_params(&params), Err(StorageError::InvalidQuery(_))));
    }
}
