// Built-in handlers bound to the storage collaborator

pub mod observe;
pub mod storage;

use std::sync::Arc;

use crate::registry::Registry;

pub use observe::ObserveHandler;
pub use storage::StorageHandler;

/// Register the CRUD handlers and the `observe` real-time handler
pub fn register_builtins(registry: &mut Registry) {
    for handler in StorageHandler::ALL {
        registry.register_handler(handler.name(), Arc::new(handler));
    }
    registry.register_realtime("observe", Arc::new(ObserveHandler));
}
