// Server assembly: compiled model in, axum router out

pub mod http;
pub mod response;
pub mod ws;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query},
    http::{HeaderMap, Method},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{JwtVerifier, TokenVerifier};
use crate::compiler::{CompiledModel, Compiler, CorsOptions};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::model::loader::load_model;
use crate::pipeline::AuthorizationGate;
use crate::realtime::{RealtimeAuthenticator, RoutingTable};
use crate::registry::Registry;
use crate::storage::{MemoryStorage, Storage};

use self::http::{dispatch, EndpointRequest, EndpointRoute};

/// Shared, read-only state built once at startup
pub struct AppState {
    pub config: AppConfig,
    pub model: Arc<CompiledModel>,
    pub gate: AuthorizationGate,
    pub verifier: Arc<dyn TokenVerifier>,
    pub storage: Arc<dyn Storage>,
    /// Present only when enabled and some node declares real-time handlers
    pub realtime: Option<Arc<RealtimeAuthenticator>>,
}

/// Load the configured model files and build the state around them
pub fn bootstrap(config: AppConfig, registry: &Registry) -> anyhow::Result<Arc<AppState>> {
    let raw = load_model(&config.model.paths).context("failed to load endpoint model")?;
    build_state(config, registry, &raw, Arc::new(MemoryStorage::new()))
}

/// Compile a merged raw tree into application state
pub fn build_state(
    config: AppConfig,
    registry: &Registry,
    raw: &Value,
    storage: Arc<dyn Storage>,
) -> anyhow::Result<Arc<AppState>> {
    let default_cors = CorsOptions::from_origins(&config.security.cors_origins);
    let model = Compiler::new(registry)
        .with_default_cors(default_cors)
        .compile_value(raw)
        .context("failed to compile endpoint model")?;

    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtVerifier::new(config.security.jwt_secret.clone()));

    let realtime = if config.realtime.enabled && model.has_realtime {
        let table = RoutingTable::build(&model.root).context("failed to build real-time routes")?;
        let authenticator = RealtimeAuthenticator::new(table, verifier.clone(), storage.clone())
            .with_auth_timeout(config.auth_timeout());
        Some(Arc::new(authenticator))
    } else {
        if model.has_realtime {
            tracing::warn!("Model declares real-time handlers but REALTIME_ENABLED is off");
        }
        None
    };

    Ok(Arc::new(AppState {
        gate: AuthorizationGate::new(verifier.clone()),
        model: Arc::new(model),
        config,
        verifier,
        storage,
        realtime,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app: Router<Arc<AppState>> = Router::new();

    for node in state.model.nodes() {
        if node.handlers.registered_methods().is_empty() {
            continue;
        }

        let cors = state.config.security.enable_cors.then(|| node.cors.layer());
        let route = Arc::new(EndpointRoute::from_node(node, cors.clone()));
        let route_state = state.clone();
        let endpoint = move |method: Method,
                             params: Option<Path<HashMap<String, String>>>,
                             query: Query<HashMap<String, String>>,
                             headers: HeaderMap,
                             body: Bytes| {
            let state = route_state.clone();
            let route = route.clone();
            async move {
                let request = EndpointRequest {
                    method,
                    params,
                    query,
                    headers,
                    body,
                };
                dispatch(state, route, request).await
            }
        };

        // OPTIONS is added after the layer so it reaches dispatch; preflights
        // are answered there by the same CORS settings
        let mut method_router = any(endpoint.clone());
        if let Some(cors) = cors {
            method_router = method_router.layer(cors);
        }
        let method_router = method_router.options(endpoint);

        tracing::debug!("Route {} -> {:?}", node.path, node.handlers.registered_methods());
        app = app.route(&node.path, method_router);
    }

    if state.model.find("/health").is_none() {
        app = app.route("/health", get(health));
    }

    let mut app = if state.realtime.is_some() {
        let mount = state.config.realtime.mount_path.trim_end_matches('/').to_string();
        app.route(&mount, get(ws::upgrade))
            .route(&format!("{}/*namespace", mount), get(ws::upgrade))
            .with_state(state.clone())
    } else {
        app.with_state(state.clone())
    };

    app = app
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes));

    if state.config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    let registry = Registry::with_builtins();
    let port = config.api.port;
    let state = bootstrap(config, &registry)?;
    let app = router(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Arbor API listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

async fn not_found() -> impl IntoResponse {
    ApiError::not_found("Endpoint not found")
}
