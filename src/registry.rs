use std::collections::HashMap;
use std::sync::Arc;

use crate::pipeline::{Handler, Policy};
use crate::realtime::RealtimeHandler;

/// Name to implementation lookup used while compiling the endpoint tree.
///
/// Handlers, policies and real-time handlers live in separate namespaces,
/// so `observe` can be both a real-time handler and an HTTP filter.
#[derive(Default, Clone)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    policies: HashMap<String, Arc<dyn Policy>>,
    realtime: HashMap<String, Arc<dyn RealtimeHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the storage-backed handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::handlers::register_builtins(&mut registry);
        registry
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!("Handler '{}' registered twice, keeping the latest", name);
        }
        self
    }

    pub fn register_policy(&mut self, name: impl Into<String>, policy: Arc<dyn Policy>) -> &mut Self {
        let name = name.into();
        if self.policies.insert(name.clone(), policy).is_some() {
            tracing::warn!("Policy '{}' registered twice, keeping the latest", name);
        }
        self
    }

    pub fn register_realtime(&mut self, name: impl Into<String>, handler: Arc<dyn RealtimeHandler>) -> &mut Self {
        let name = name.into();
        if self.realtime.insert(name.clone(), handler).is_some() {
            tracing::warn!("Real-time handler '{}' registered twice, keeping the latest", name);
        }
        self
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn policy(&self, name: &str) -> Option<Arc<dyn Policy>> {
        self.policies.get(name).cloned()
    }

    pub fn realtime(&self, name: &str) -> Option<Arc<dyn RealtimeHandler>> {
        self.realtime.get(name).cloned()
    }

    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_resolvable() {
        let registry = Registry::with_builtins();
        for name in ["create", "readOne", "readMany", "update", "patch", "remove"] {
            assert!(registry.handler(name).is_some(), "missing handler {}", name);
        }
        assert!(registry.realtime("observe").is_some());
        assert!(registry.policy("observe").is_none());
    }
}
