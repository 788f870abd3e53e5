#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use arbor_api::auth::{Claims, JwtVerifier};
use arbor_api::config::AppConfig;
use arbor_api::registry::Registry;
use arbor_api::server::{build_state, router, AppState};
use arbor_api::storage::MemoryStorage;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub fn config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "SECURITY_JWT_SECRET" => Some(SECRET.to_string()),
        "SECURITY_CORS_ORIGINS" => Some("*".to_string()),
        "REALTIME_AUTH_TIMEOUT_MS" => Some("5000".to_string()),
        _ => None,
    })
}

pub fn state(model: Value, registry: &Registry) -> Result<Arc<AppState>> {
    build_state(config(), registry, &model, Arc::new(MemoryStorage::new()))
}

pub fn app(model: Value, registry: &Registry) -> Result<Router> {
    Ok(router(state(model, registry)?))
}

pub fn token(roles: &[&str]) -> String {
    let claims = Claims::new(Some("u1".into()), roles.iter().map(|r| r.to_string()).collect(), 1);
    JwtVerifier::new(SECRET).issue(&claims).expect("token")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok(TestResponse { status, headers, body })
}
