use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::pipeline::HandlerError;
use crate::realtime::connection::UPDATE;
use crate::realtime::{RealtimeContext, RealtimeHandler};
use crate::storage::{Change, ChangeCallback, Query};

/// Subscribe the connection to changes in the endpoint's collection. The
/// connection query (minus transport keys) filters which records are sent.
pub struct ObserveHandler;

#[async_trait]
impl RealtimeHandler for ObserveHandler {
    async fn handle(&self, data: Value, ctx: &RealtimeContext) -> Result<Value, HandlerError> {
        let collection = ctx.collection()?;
        let query = Query::from_params(&ctx.query)?;

        let connection = ctx.connection.clone();
        let on_change: ChangeCallback = Arc::new(move |change: &Change| {
            connection.emit(UPDATE, Some(json!({"kind": change.kind, "record": change.record})));
        });

        ctx.storage
            .observe(collection, query, ctx.connection.clone(), on_change)
            .await?;

        tracing::debug!("Connection {} observing '{}'", ctx.connection.id(), collection);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthContext;
    use crate::realtime::{ConnectionHandle, Outbound};
    use crate::storage::{MemoryStorage, Storage};
    use std::collections::HashMap;

    #[tokio::test]
    async fn matching_writes_become_update_events() {
        let storage = Arc::new(MemoryStorage::new());
        let (connection, mut rx) = ConnectionHandle::channel();
        let ctx = RealtimeContext {
            connection,
            path: "/todos".to_string(),
            params: HashMap::new(),
            query: [("status".to_string(), "open".to_string())].into_iter().collect(),
            auth: AuthContext::anonymous(),
            collection: Some("todos".to_string()),
            storage: storage.clone(),
            event: None,
        };

        ObserveHandler.handle(Value::Null, &ctx).await.unwrap();

        storage.create("todos", json!({"id": "1", "status": "done"})).await.unwrap();
        storage.create("todos", json!({"id": "2", "status": "open"})).await.unwrap();
        storage.create("notes", json!({"id": "3", "status": "open"})).await.unwrap();

        match rx.recv().await.unwrap() {
            Outbound::Event(event) => {
                assert_eq!(event.event, UPDATE);
                assert_eq!(
                    event.data,
                    Some(json!({"kind": "created", "record": {"id": "2", "status": "open"}}))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn requires_a_collection() {
        let (connection, _rx) = ConnectionHandle::channel();
        let ctx = RealtimeContext {
            connection,
            path: "/loose".to_string(),
            params: HashMap::new(),
            query: HashMap::new(),
            auth: AuthContext::anonymous(),
            collection: None,
            storage: Arc::new(MemoryStorage::new()),
            event: None,
        };
        assert!(matches!(
            ObserveHandler.handle(Value::Null, &ctx).await,
            Err(HandlerError::NoCollection(_))
        ));
    }
}
