use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;

use crate::error::ApiError;
use crate::pipeline::{Flow, Handler, HandlerError, HandlerMeta, Stop};
use crate::storage::{Query, StorageError};

/// Path parameter naming the record for single-record operations
pub const ID_PARAM: &str = "id";

/// CRUD operations against the collection bound to the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageHandler {
    Create,
    ReadOne,
    ReadMany,
    Update,
    Patch,
    Remove,
}

impl StorageHandler {
    pub const ALL: [StorageHandler; 6] = [
        StorageHandler::Create,
        StorageHandler::ReadOne,
        StorageHandler::ReadMany,
        StorageHandler::Update,
        StorageHandler::Patch,
        StorageHandler::Remove,
    ];

    /// Name used in endpoint declarations
    pub fn name(&self) -> &'static str {
        match self {
            StorageHandler::Create => "create",
            StorageHandler::ReadOne => "readOne",
            StorageHandler::ReadMany => "readMany",
            StorageHandler::Update => "update",
            StorageHandler::Patch => "patch",
            StorageHandler::Remove => "remove",
        }
    }

    async fn run(&self, data: Value, meta: &mut HandlerMeta) -> Result<Flow<Value>, StorageError> {
        let collection = match meta.collection.clone() {
            Some(collection) => collection,
            None => return Ok(Flow::Stop(missing_collection(&meta.path))),
        };
        let storage = meta.storage.clone();

        let record = match self {
            StorageHandler::Create => {
                let record = storage.create(&collection, data).await?;
                meta.status = Some(StatusCode::CREATED);
                Some(record)
            }
            StorageHandler::ReadMany => {
                let query = Query::from_params(&meta.query)?;
                let page = storage.read_many(&collection, &query).await?;
                Some(serde_json::to_value(page).map_err(|e| StorageError::Backend(e.to_string()))?)
            }
            _ => {
                let Some(id) = meta.param(ID_PARAM).map(str::to_string) else {
                    return Ok(Flow::Stop(Stop::from_error(ApiError::bad_request(format!(
                        "'{}' requires an :{} path parameter",
                        self.name(),
                        ID_PARAM
                    )))));
                };
                match self {
                    StorageHandler::ReadOne => storage.read_one(&collection, &id).await?,
                    StorageHandler::Update => Some(storage.update(&collection, &id, data).await?),
                    StorageHandler::Patch => storage.patch(&collection, &id, data).await?,
                    _ => storage.remove(&collection, &id).await?,
                }
            }
        };

        Ok(match record {
            Some(record) => Flow::Continue(record),
            None => Flow::Stop(Stop::from_error(ApiError::not_found("Record not found"))),
        })
    }
}

fn missing_collection(path: &str) -> Stop {
    tracing::error!("Endpoint '{}' uses a storage handler but has no collection", path);
    Stop::internal()
}

#[async_trait]
impl Handler for StorageHandler {
    async fn handle(&self, data: Value, meta: &mut HandlerMeta) -> Result<Flow<Value>, HandlerError> {
        match self.run(data, meta).await {
            Ok(flow) => Ok(flow),
            Err(error) => {
                tracing::debug!("Storage handler '{}' on {} failed: {}", self.name(), meta.path, error);
                Ok(Flow::Stop(Stop::from_error(error.into())))
            }
        }
    }
}
