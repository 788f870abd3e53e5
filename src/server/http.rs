// HTTP binding: one route per compiled node, gate then chain

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, Request},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower::{service_fn, Layer, ServiceExt};
use tower_http::cors::CorsLayer;

use super::response::{method_not_allowed, ApiResponse};
use super::AppState;
use crate::compiler::{AuthTable, CompiledNode};
use crate::error::ApiError;
use crate::model::HttpMethod;
use crate::pipeline::fields::redact;
use crate::pipeline::{AuthorizationGate, ChainOutcome, GateDecision, GateRequest, HandlerChain, HandlerMeta};

/// Everything a request to one node needs, with chains built once
#[derive(Debug, Clone)]
pub struct EndpointRoute {
    pub path: String,
    pub auth: AuthTable,
    pub fields: Vec<(String, AuthTable)>,
    pub collection: Option<String>,
    /// Answers CORS preflights; `None` when CORS is disabled
    pub cors: Option<CorsLayer>,
    chains: [HandlerChain; 7],
}

impl EndpointRoute {
    pub fn from_node(node: &CompiledNode, cors: Option<CorsLayer>) -> Self {
        Self {
            path: node.path.clone(),
            auth: node.auth.clone(),
            fields: node.fields.clone(),
            collection: node.collection.clone(),
            cors,
            chains: HttpMethod::ALL.map(|method| HandlerChain::for_method(node, method)),
        }
    }

    pub fn chain(&self, method: HttpMethod) -> &HandlerChain {
        &self.chains[method.index()]
    }

    /// Methods that are both permitted and have something to run
    fn servable_methods(&self) -> Vec<HttpMethod> {
        self.auth
            .allowed_methods()
            .into_iter()
            .filter(|method| *method == HttpMethod::Options || !self.chain(*method).is_empty())
            .collect()
    }
}

/// Parts extracted by axum for every endpoint request
pub struct EndpointRequest {
    pub method: Method,
    pub params: Option<Path<HashMap<String, String>>>,
    pub query: Query<HashMap<String, String>>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub async fn dispatch(state: Arc<AppState>, route: Arc<EndpointRoute>, request: EndpointRequest) -> Response {
    let Some(method) = HttpMethod::from_http(&request.method) else {
        return method_not_allowed(&route.auth.allowed_methods());
    };

    if method == HttpMethod::Options && is_preflight(&request.headers) {
        if let Some(cors) = &route.cors {
            return preflight(cors.clone(), request.headers).await;
        }
    }

    if let Err(GateDecision::MethodNotAllowed { allow }) = AuthorizationGate::check_method(&route.auth, method) {
        tracing::debug!("{} {} is disabled", method, route.path);
        return method_not_allowed(&allow);
    }

    let chain = route.chain(method);
    if chain.is_empty() {
        if method == HttpMethod::Options {
            return StatusCode::NO_CONTENT.into_response();
        }
        return method_not_allowed(&route.servable_methods());
    }

    let mut input = if request.body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&request.body) {
            Ok(value) => value,
            Err(e) => return ApiError::invalid_json(format!("Invalid JSON body: {}", e)).into_response(),
        }
    };

    let params = request.params.map(|Path(params)| params).unwrap_or_default();
    let Query(query) = request.query;

    let decision = state
        .gate
        .authorize(
            &route.auth,
            GateRequest {
                method,
                path: route.path.clone(),
                params: params.clone(),
                query: query.clone(),
                headers: request.headers.clone(),
            },
        )
        .await;

    let auth = match decision {
        GateDecision::Authorized(auth) => auth,
        GateDecision::MethodNotAllowed { allow } => return method_not_allowed(&allow),
        GateDecision::Rejected(stop) => return stop.into_response(),
    };

    if !method.is_read() {
        let removed = redact(&mut input, &route.fields, method.into(), &auth);
        if !removed.is_empty() {
            tracing::debug!("Dropped protected input fields {:?} on {} {}", removed, method, route.path);
        }
    }

    let mut meta = HandlerMeta {
        method,
        path: route.path.clone(),
        params,
        query,
        headers: request.headers,
        auth,
        collection: route.collection.clone(),
        storage: state.storage.clone(),
        status: None,
    };

    match chain.run(input, &mut meta).await {
        ChainOutcome::Completed(mut output) => {
            if method.is_read() {
                redact(&mut output, &route.fields, method.into(), &meta.auth);
            }
            ApiResponse::with_status(output, meta.status.unwrap_or(StatusCode::OK)).into_response()
        }
        ChainOutcome::Stopped(stop) => stop.into_response(),
    }
}

fn is_preflight(headers: &HeaderMap) -> bool {
    headers.contains_key(header::ORIGIN) && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Let the node's CORS layer answer a preflight on its own
async fn preflight(cors: CorsLayer, headers: HeaderMap) -> Response {
    let mut request = Request::new(Body::empty());
    *request.method_mut() = Method::OPTIONS;
    *request.headers_mut() = headers;

    let service = cors.layer(service_fn(|_: Request| async {
        Ok::<_, Infallible>(StatusCode::NO_CONTENT.into_response())
    }));

    match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
