// Per-request pipeline: authorization gate, policies, handler chains

pub mod chain;
pub mod fields;
pub mod gate;
pub mod handler;
pub mod policy;

use axum::http::StatusCode;
use serde_json::Value;

use crate::error::ApiError;

pub use chain::{ChainOutcome, HandlerChain};
pub use gate::{AuthorizationGate, GateDecision, GateRequest};
pub use handler::{handler_fn, Handler, HandlerError, HandlerMeta, HandlerRef};
pub use policy::{policy_fn, AuthenticationPolicy, Policy, PolicyContext};

/// Early exit from a policy or handler chain
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub status: StatusCode,
    pub payload: Option<Value>,
}

impl Stop {
    pub fn new(status: StatusCode, payload: impl Into<Option<Value>>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    /// Generic failure used when a step errors or panics
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, None)
    }

    pub fn from_error(error: ApiError) -> Self {
        let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, error.to_json())
    }
}

/// What a step hands back: the value for the next step, or a stop
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T> {
    Continue(T),
    Stop(Stop),
}

impl<T> Flow<T> {
    pub fn stop(status: StatusCode, payload: impl Into<Option<Value>>) -> Self {
        Flow::Stop(Stop::new(status, payload))
    }
}
