use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::connection::ConnectionHandle;
use crate::auth::AuthContext;
use crate::pipeline::HandlerError;
use crate::storage::Storage;

/// Per-connection state handed to connect/message/disconnect handlers
pub struct RealtimeContext {
    pub connection: ConnectionHandle,
    /// Route pattern matched by the namespace
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub auth: AuthContext,
    pub collection: Option<String>,
    pub storage: Arc<dyn Storage>,
    /// Name of the inbound event being handled, for message handlers
    pub event: Option<String>,
}

impl RealtimeContext {
    pub fn collection(&self) -> Result<&str, HandlerError> {
        self.collection
            .as_deref()
            .ok_or_else(|| HandlerError::NoCollection(self.path.clone()))
    }
}

impl fmt::Debug for RealtimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeContext")
            .field("connection", &self.connection.id())
            .field("path", &self.path)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("auth", &self.auth)
            .field("collection", &self.collection)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Real-time handlers are a plain fold: each consumes the previous return
/// value. There is no stop; messages are fire-and-forget.
#[async_trait]
pub trait RealtimeHandler: Send + Sync {
    async fn handle(&self, data: Value, ctx: &RealtimeContext) -> Result<Value, HandlerError>;
}

#[derive(Clone)]
pub struct RealtimeHandlerRef {
    pub name: String,
    pub handler: Arc<dyn RealtimeHandler>,
}

impl RealtimeHandlerRef {
    pub fn new(name: impl Into<String>, handler: Arc<dyn RealtimeHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl fmt::Debug for RealtimeHandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealtimeHandlerRef({})", self.name)
    }
}

impl PartialEq for RealtimeHandlerRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Run handlers in sequence. A failing handler is logged and ends this
/// fold only; the connection stays up.
pub async fn run_fold(stage: &str, handlers: &[RealtimeHandlerRef], input: Value, ctx: &RealtimeContext) -> Option<Value> {
    let mut data = input;
    for step in handlers {
        match AssertUnwindSafe(step.handler.handle(data, ctx)).catch_unwind().await {
            Ok(Ok(next)) => data = next,
            Ok(Err(error)) => {
                tracing::error!(
                    "Real-time {} handler '{}' failed on {} ({}): {}",
                    stage, step.name, ctx.path, ctx.connection.id(), error
                );
                return None;
            }
            Err(_) => {
                tracing::error!(
                    "Real-time {} handler '{}' panicked on {} ({})",
                    stage, step.name, ctx.path, ctx.connection.id()
                );
                return None;
            }
        }
    }
    Some(data)
}

pub struct FnRealtimeHandler<F>(F);

#[async_trait]
impl<F> RealtimeHandler for FnRealtimeHandler<F>
where
    F: Fn(Value, &RealtimeContext) -> Result<Value, HandlerError> + Send + Sync,
{
    async fn handle(&self, data: Value, ctx: &RealtimeContext) -> Result<Value, HandlerError> {
        (self.0)(data, ctx)
    }
}

/// Wrap a synchronous closure as a real-time handler
pub fn realtime_fn<F>(f: F) -> Arc<dyn RealtimeHandler>
where
    F: Fn(Value, &RealtimeContext) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnRealtimeHandler(f))
}
