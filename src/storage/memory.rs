use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{Change, ChangeCallback, ChangeKind, Page, Query, Storage, StorageError};
use crate::realtime::ConnectionHandle;

const CHANGE_BUFFER: usize = 256;

/// In-process storage keyed by collection. Records are JSON objects with a
/// string `id`; insertion order is kept for paging.
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    changes: broadcast::Sender<Change>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn publish(&self, kind: ChangeKind, collection: &str, record: &Value) {
        // No subscribers is fine
        let _ = self.changes.send(Change {
            kind,
            collection: collection.to_string(),
            record: record.clone(),
        });
    }

    fn into_object(data: Value) -> Result<Map<String, Value>, StorageError> {
        match data {
            Value::Object(map) => Ok(map),
            other => Err(StorageError::InvalidData(format!("expected an object, got {}", other))),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, collection: &str, data: Value) -> Result<Value, StorageError> {
        let mut object = Self::into_object(data)?;
        let id = match object.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(StorageError::InvalidData(format!("id must be a string, got {}", other))),
            None => Uuid::new_v4().to_string(),
        };
        object.insert("id".to_string(), Value::String(id.clone()));
        let record = Value::Object(object);

        {
            let mut collections = self.collections.write();
            let records = collections.entry(collection.to_string()).or_default();
            if records.iter().any(|r| record_id(r) == Some(id.as_str())) {
                return Err(StorageError::InvalidData(format!("duplicate id '{}'", id)));
            }
            records.push(record.clone());
        }

        tracing::debug!("Created record {} in {}", id, collection);
        self.publish(ChangeKind::Created, collection, &record);
        Ok(record)
    }

    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|records| records.iter().find(|r| record_id(r) == Some(id)).cloned()))
    }

    async fn read_many(&self, collection: &str, query: &Query) -> Result<Page, StorageError> {
        let offset = match &query.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| StorageError::InvalidQuery(format!("invalid cursor '{}'", cursor)))?,
            None => 0,
        };

        let collections = self.collections.read();
        let matching: Vec<&Value> = collections
            .get(collection)
            .map(|records| records.iter().filter(|r| query.matches(r)).collect())
            .unwrap_or_default();

        let count = matching.len();
        let limit = query.limit.unwrap_or(count);
        let documents: Vec<Value> = matching.into_iter().skip(offset).take(limit).cloned().collect();
        let next = offset + documents.len();
        let cursor = (next < count).then(|| next.to_string());

        Ok(Page {
            documents,
            count,
            cursor,
        })
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, StorageError> {
        let mut object = Self::into_object(data)?;
        object.insert("id".to_string(), Value::String(id.to_string()));
        let record = Value::Object(object);

        {
            let mut collections = self.collections.write();
            let slot = collections
                .get_mut(collection)
                .and_then(|records| records.iter_mut().find(|r| record_id(r) == Some(id)))
                .ok_or_else(|| StorageError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            *slot = record.clone();
        }

        self.publish(ChangeKind::Updated, collection, &record);
        Ok(record)
    }

    async fn patch(&self, collection: &str, id: &str, data: Value) -> Result<Option<Value>, StorageError> {
        let changes = Self::into_object(data)?;

        let patched = {
            let mut collections = self.collections.write();
            let Some(slot) = collections
                .get_mut(collection)
                .and_then(|records| records.iter_mut().find(|r| record_id(r) == Some(id)))
            else {
                return Ok(None);
            };
            if let Value::Object(existing) = slot {
                for (key, value) in changes {
                    if key != "id" {
                        existing.insert(key, value);
                    }
                }
            }
            slot.clone()
        };

        self.publish(ChangeKind::Patched, collection, &patched);
        Ok(Some(patched))
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let removed = {
            let mut collections = self.collections.write();
            collections.get_mut(collection).and_then(|records| {
                records
                    .iter()
                    .position(|r| record_id(r) == Some(id))
                    .map(|index| records.remove(index))
            })
        };

        if let Some(record) = &removed {
            self.publish(ChangeKind::Removed, collection, record);
        }
        Ok(removed)
    }

    async fn observe(
        &self,
        collection: &str,
        query: Query,
        connection: ConnectionHandle,
        on_change: ChangeCallback,
    ) -> Result<(), StorageError> {
        let mut changes = self.changes.subscribe();
        let collection = collection.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = connection.closed() => break,
                    received = changes.recv() => match received {
                        Ok(change) => {
                            if change.collection == collection && query.matches(&change.record) {
                                on_change(&change);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(
                                "Observer for {} on connection {} lagged, {} changes dropped",
                                collection, connection.id(), missed
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Observer for {} on connection {} stopped", collection, connection.id());
        });

        Ok(())
    }
}
