use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::Flow;
use crate::auth::AuthContext;
use crate::model::HttpMethod;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no collection bound to endpoint '{0}'")]
    NoCollection(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    pub fn message(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }
}

/// Request data visible to every step of a chain
pub struct HandlerMeta {
    pub method: HttpMethod,
    /// Route pattern of the compiled node, e.g. `/todos/:id`
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub auth: AuthContext,
    pub collection: Option<String>,
    pub storage: Arc<dyn Storage>,
    /// Status for a completed chain; defaults to 200
    pub status: Option<StatusCode>,
}

impl HandlerMeta {
    pub fn collection(&self) -> Result<&str, HandlerError> {
        self.collection
            .as_deref()
            .ok_or_else(|| HandlerError::NoCollection(self.path.clone()))
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl fmt::Debug for HandlerMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMeta")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("auth", &self.auth)
            .field("collection", &self.collection)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// One step of a handler/filter chain.
///
/// A step receives the value produced by the previous step and either
/// continues with a (possibly transformed) value or stops the chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, data: Value, meta: &mut HandlerMeta) -> Result<Flow<Value>, HandlerError>;
}

/// A registry entry resolved during compilation
#[derive(Clone)]
pub struct HandlerRef {
    pub name: String,
    pub handler: Arc<dyn Handler>,
}

impl HandlerRef {
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerRef({})", self.name)
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Value, &mut HandlerMeta) -> Result<Flow<Value>, HandlerError> + Send + Sync,
{
    async fn handle(&self, data: Value, meta: &mut HandlerMeta) -> Result<Flow<Value>, HandlerError> {
        (self.0)(data, meta)
    }
}

/// Wrap a synchronous closure as a handler
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Value, &mut HandlerMeta) -> Result<Flow<Value>, HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
