mod common;

use anyhow::Result;
use arbor_api::pipeline::{handler_fn, policy_fn, Flow};
use arbor_api::registry::Registry;
use axum::http::{header, Method, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use common::{app, send, token, SECRET};

fn registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry
        .register_handler("hello", handler_fn(|_, meta| Ok(Flow::Continue(json!({"hello": meta.path.clone()})))))
        .register_policy(
            "weekdaysOnly",
            policy_fn("weekdaysOnly", |ctx| {
                if ctx.query.get("day").map(String::as_str) == Some("sunday") {
                    Ok(Flow::stop(StatusCode::FORBIDDEN, json!({"message": "closed on sundays"})))
                } else {
                    Ok(Flow::Continue(()))
                }
            }),
        );
    registry
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let app = app(json!({}), &registry())?;
    let res = send(&app, Method::GET, "/health", None, None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn forbidden_read_is_405_without_get_in_allow() -> Result<()> {
    let app = app(
        json!({"/locked": {"auth": {"read": false, "write": true}, "handlers": {"GET": "hello", "POST": "hello"}}}),
        &registry(),
    )?;

    let res = send(&app, Method::GET, "/locked", None, None).await?;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    let allow = res.headers[header::ALLOW].to_str()?;
    assert!(!allow.contains("GET"), "allow was {}", allow);
    assert!(!allow.contains("HEAD"));
    assert!(allow.contains("POST"));

    let res = send(&app, Method::POST, "/locked", None, None).await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn default_model_requires_authentication() -> Result<()> {
    let app = app(json!({"/private": {"handlers": {"read": "hello"}}}), &registry())?;

    let res = send(&app, Method::GET, "/private", None, None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Invalid token");

    let res = send(&app, Method::GET, "/private", Some("not-a-jwt"), None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = send(&app, Method::GET, "/private", Some(&token(&[])), None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({"success": true, "data": {"hello": "/private"}}));
    Ok(())
}

#[tokio::test]
async fn role_requirement_is_enforced() -> Result<()> {
    let app = app(
        json!({"/admin": {"auth": {"requiresRoles": ["admin"]}, "handlers": {"read": "hello"}}}),
        &registry(),
    )?;

    let res = send(&app, Method::GET, "/admin", Some(&token(&["user"])), None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Missing required role");

    let res = send(&app, Method::GET, "/admin", Some(&token(&[])), None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = send(&app, Method::GET, "/admin", Some(&token(&["user", "admin"])), None).await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tokens_with_only_role_claims_are_accepted() -> Result<()> {
    let app = app(
        json!({"/admin": {"auth": {"requiresRoles": ["admin"]}, "handlers": {"read": "hello"}}}),
        &registry(),
    )?;
    let key = EncodingKey::from_secret(SECRET.as_bytes());
    let exp = chrono::Utc::now().timestamp() + 3600;

    let with_exp = encode(&Header::default(), &json!({"roles": ["admin"], "exp": exp}), &key)?;
    let res = send(&app, Method::GET, "/admin", Some(&with_exp), None).await?;
    assert_eq!(res.status, StatusCode::OK);

    let bare = encode(&Header::default(), &json!({"roles": ["admin"]}), &key)?;
    let res = send(&app, Method::GET, "/admin", Some(&bare), None).await?;
    assert_eq!(res.status, StatusCode::OK);

    let expired = encode(&Header::default(), &json!({"roles": ["admin"], "exp": exp - 7200}), &key)?;
    let res = send(&app, Method::GET, "/admin", Some(&expired), None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Invalid token");
    Ok(())
}

#[tokio::test]
async fn policy_stop_payload_becomes_response() -> Result<()> {
    let app = app(
        json!({"/shop": {"auth": {"requiresAuth": false, "policies": ["weekdaysOnly"]}, "handlers": {"read": "hello"}}}),
        &registry(),
    )?;

    let res = send(&app, Method::GET, "/shop?day=sunday", None, None).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body, json!({"message": "closed on sundays"}));

    let res = send(&app, Method::GET, "/shop?day=monday", None, None).await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn method_without_handlers_is_405_but_options_is_204() -> Result<()> {
    let app = app(
        json!({"/things": {"auth": true, "handlers": {"GET": "hello"}}}),
        &registry(),
    )?;

    let res = send(&app, Method::DELETE, "/things", None, None).await?;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers[header::ALLOW], "GET, OPTIONS");

    let res = send(&app, Method::OPTIONS, "/things", None, None).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn unknown_paths_are_404() -> Result<()> {
    let app = app(json!({"/things": {"auth": true, "handlers": {"GET": "hello"}}}), &registry())?;
    let res = send(&app, Method::GET, "/nothing/here", None, None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn per_method_override_beats_read_shortcut() -> Result<()> {
    let app = app(
        json!({"/mixed": {
            "auth": {"read": false, "GET": {"requiresAuth": false}},
            "handlers": {"read": "hello"}
        }}),
        &registry(),
    )?;

    let res = send(&app, Method::GET, "/mixed", None, None).await?;
    assert_eq!(res.status, StatusCode::OK);

    let res = send(&app, Method::HEAD, "/mixed", None, None).await?;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

#[tokio::test]
async fn cors_preflight_is_answered_by_node_settings() -> Result<()> {
    let app = app(
        json!({"/things": {"auth": true, "cors": {"origin": "https://app.test"}, "handlers": {"GET": "hello"}}}),
        &registry(),
    )?;

    let request = axum::http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/things")
        .header(header::ORIGIN, "https://app.test")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(axum::body::Body::empty())?;
    let response = tower::ServiceExt::oneshot(app.clone(), request).await?;
    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.test");

    let request = axum::http::Request::builder()
        .uri("/things")
        .header(header::ORIGIN, "https://app.test")
        .body(axum::body::Body::empty())?;
    let response = tower::ServiceExt::oneshot(app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.test");
    Ok(())
}
