use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;

use super::handler::{HandlerMeta, HandlerRef};
use super::{Flow, Stop};
use crate::compiler::CompiledNode;
use crate::model::HttpMethod;

#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Every step continued; the value becomes the response body
    Completed(Value),
    /// A step stopped (or failed) the chain
    Stopped(Stop),
}

/// Ordered handler/filter list for one (node, method) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerChain {
    steps: Vec<HandlerRef>,
}

impl HandlerChain {
    pub fn new(steps: Vec<HandlerRef>) -> Self {
        Self { steps }
    }

    /// Reads produce data then shape it (handlers, then filters); writes
    /// sanitize input first (filters, then handlers).
    pub fn for_method(node: &CompiledNode, method: HttpMethod) -> Self {
        let handlers = node.handlers.handlers(method);
        let filters = node.handlers.filters(method);

        let steps = if method.is_read() {
            handlers.iter().chain(filters).cloned().collect()
        } else {
            filters.iter().chain(handlers).cloned().collect()
        };

        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    /// Run steps strictly in order. Errors and panics inside a step end the
    /// chain with a 500.
    pub async fn run(&self, input: Value, meta: &mut HandlerMeta) -> ChainOutcome {
        if self.steps.is_empty() {
            tracing::warn!(
                "Empty handler chain for {} {}, passing data through",
                meta.method, meta.path
            );
            return ChainOutcome::Completed(input);
        }

        let mut data = input;
        for step in &self.steps {
            let result = AssertUnwindSafe(step.handler.handle(data, meta)).catch_unwind().await;

            match result {
                Ok(Ok(Flow::Continue(next))) => data = next,
                Ok(Ok(Flow::Stop(stop))) => {
                    tracing::debug!(
                        "Handler '{}' stopped {} {} with status {}",
                        step.name, meta.method, meta.path, stop.status
                    );
                    return ChainOutcome::Stopped(stop);
                }
                Ok(Err(error)) => {
                    tracing::error!(
                        "Handler '{}' failed for {} {}: {}",
                        step.name, meta.method, meta.path, error
                    );
                    return ChainOutcome::Stopped(Stop::internal());
                }
                Err(_) => {
                    tracing::error!("Handler '{}' panicked for {} {}", step.name, meta.method, meta.path);
                    return ChainOutcome::Stopped(Stop::internal());
                }
            }
        }

        ChainOutcome::Completed(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthContext;
    use crate::pipeline::handler::{handler_fn, HandlerError};
    use crate::storage::MemoryStorage;
    use axum::http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn meta() -> HandlerMeta {
        HandlerMeta {
            method: HttpMethod::Get,
            path: "/test".to_string(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            auth: AuthContext::anonymous(),
            collection: None,
            storage: Arc::new(MemoryStorage::new()),
            status: None,
        }
    }

    fn step(name: &str, f: impl Fn(Value) -> Result<Flow<Value>, HandlerError> + Send + Sync + 'static) -> HandlerRef {
        HandlerRef::new(name, handler_fn(move |data, _| f(data)))
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let outcome = HandlerChain::default().run(json!({"a": 1}), &mut meta()).await;
        assert_eq!(outcome, ChainOutcome::Completed(json!({"a": 1})));
    }

    #[tokio::test]
    async fn steps_transform_in_order() {
        let chain = HandlerChain::new(vec![
            step("one", |_| Ok(Flow::Continue(json!([1])))),
            step("two", |data| {
                let mut list = data.as_array().cloned().unwrap_or_default();
                list.push(json!(2));
                Ok(Flow::Continue(Value::Array(list)))
            }),
        ]);
        assert_eq!(chain.run(Value::Null, &mut meta()).await, ChainOutcome::Completed(json!([1, 2])));
    }

    #[tokio::test]
    async fn stop_skips_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let chain = HandlerChain::new(vec![
            step("one", |data| Ok(Flow::Continue(data))),
            step("two", |_| Ok(Flow::stop(StatusCode::NOT_FOUND, json!("X")))),
            step("three", move |data| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue(data))
            }),
        ]);

        let outcome = chain.run(Value::Null, &mut meta()).await;
        assert_eq!(outcome, ChainOutcome::Stopped(Stop::new(StatusCode::NOT_FOUND, json!("X"))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn errors_and_panics_become_500() {
        let failing = HandlerChain::new(vec![step("bad", |_| Err(HandlerError::message("boom")))]);
        assert_eq!(
            failing.run(Value::Null, &mut meta()).await,
            ChainOutcome::Stopped(Stop::internal())
        );

        let panicking = HandlerChain::new(vec![step("worse", |_| panic!("boom"))]);
        assert_eq!(
            panicking.run(Value::Null, &mut meta()).await,
            ChainOutcome::Stopped(Stop::internal())
        );
    }
}
