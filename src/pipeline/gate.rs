use axum::http::HeaderMap;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::policy::PolicyContext;
use super::{Flow, Stop};
use crate::auth::{AuthContext, TokenVerifier};
use crate::compiler::{AuthEntry, AuthTable, Requirement};
use crate::model::HttpMethod;

/// Terminal state of the gate for one request
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Authorized; the context goes to the handler chain
    Authorized(AuthContext),
    /// The method's entry is `false` (405). Lists every non-forbidden method.
    MethodNotAllowed { allow: Vec<HttpMethod> },
    /// Unauthenticated, missing role, or a policy said stop
    Rejected(Stop),
}

/// The parts of an HTTP request the gate and policies look at
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
}

pub struct AuthorizationGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Step 1 on its own: is the method forbidden outright
    pub fn check_method(table: &AuthTable, method: HttpMethod) -> Result<&Requirement, GateDecision> {
        match table.get(method) {
            AuthEntry::Forbidden => Err(GateDecision::MethodNotAllowed {
                allow: table.allowed_methods(),
            }),
            AuthEntry::Required(requirement) => Ok(requirement),
        }
    }

    pub async fn authorize(&self, table: &AuthTable, request: GateRequest) -> GateDecision {
        let requirement = match Self::check_method(table, request.method) {
            Ok(requirement) => requirement,
            Err(decision) => return decision,
        };

        let mut ctx = PolicyContext::new(
            request.method,
            request.path,
            request.params,
            request.query,
            request.headers,
            requirement.requires_auth,
            requirement.requires_roles.clone(),
            self.verifier.clone(),
        );

        // Built-in authentication runs first; a failing or panicking policy
        // ends the chain with a 500.
        for policy in &requirement.policies {
            let result = AssertUnwindSafe(policy.check(&mut ctx)).catch_unwind().await;

            match result {
                Ok(Ok(Flow::Continue(()))) => {}
                Ok(Ok(Flow::Stop(stop))) => {
                    tracing::debug!(
                        "Policy '{}' rejected {} {} with status {}",
                        policy.name(), ctx.method, ctx.path, stop.status
                    );
                    return GateDecision::Rejected(stop);
                }
                Ok(Err(error)) => {
                    tracing::error!("Policy '{}' failed for {} {}: {}", policy.name(), ctx.method, ctx.path, error);
                    return GateDecision::Rejected(Stop::internal());
                }
                Err(_) => {
                    tracing::error!("Policy '{}' panicked for {} {}", policy.name(), ctx.method, ctx.path);
                    return GateDecision::Rejected(Stop::internal());
                }
            }
        }

        GateDecision::Authorized(ctx.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, JwtVerifier};
    use crate::compiler::Compiler;
    use crate::pipeline::handler::HandlerError;
    use crate::pipeline::policy_fn;
    use crate::registry::Registry;
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;

    const SECRET: &str = "gate-secret";

    fn request(method: HttpMethod, token: Option<&str>) -> GateRequest {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        GateRequest {
            method,
            path: "/".to_string(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers,
        }
    }

    fn token(roles: &[&str]) -> String {
        JwtVerifier::new(SECRET)
            .issue(&Claims::new(Some("u1".into()), roles.iter().map(|r| r.to_string()).collect(), 1))
            .unwrap()
    }

    fn table(raw: serde_json::Value, registry: &Registry) -> AuthTable {
        Compiler::new(registry).compile_value(&raw).unwrap().root.auth
    }

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(JwtVerifier::new(SECRET)))
    }

    #[tokio::test]
    async fn forbidden_method_lists_allowed_ones() {
        let registry = Registry::new();
        let auth = table(json!({"auth": {"read": false}}), &registry);
        let decision = gate().authorize(&auth, request(HttpMethod::Get, None)).await;
        assert_eq!(
            decision,
            GateDecision::MethodNotAllowed {
                allow: vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete]
            }
        );
    }

    #[tokio::test]
    async fn missing_token_is_401_when_auth_required() {
        let registry = Registry::new();
        let auth = table(json!({}), &registry);
        match gate().authorize(&auth, request(HttpMethod::Get, None)).await {
            GateDecision::Rejected(stop) => {
                assert_eq!(stop.status, StatusCode::UNAUTHORIZED);
                assert_eq!(stop.payload.unwrap()["message"], "Invalid token");
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_token_is_tolerated_on_open_methods() {
        let registry = Registry::new();
        let auth = table(json!({"auth": true}), &registry);
        let decision = gate().authorize(&auth, request(HttpMethod::Get, Some("garbage"))).await;
        match decision {
            GateDecision::Authorized(ctx) => {
                assert!(!ctx.is_authenticated);
                assert!(ctx.roles.is_empty());
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[tokio::test]
    async fn role_mismatch_is_401() {
        let registry = Registry::new();
        let auth = table(json!({"auth": {"requiresRoles": ["admin"]}}), &registry);
        match gate().authorize(&auth, request(HttpMethod::Post, Some(&token(&["user"])))).await {
            GateDecision::Rejected(stop) => {
                assert_eq!(stop.status, StatusCode::UNAUTHORIZED);
                assert_eq!(stop.payload.unwrap()["message"], "Missing required role");
            }
            other => panic!("unexpected decision {:?}", other),
        }

        let decision = gate()
            .authorize(&auth, request(HttpMethod::Post, Some(&token(&["user", "admin"]))))
            .await;
        assert!(matches!(decision, GateDecision::Authorized(ctx) if ctx.is_authenticated));
    }

    #[tokio::test]
    async fn custom_policies_run_after_authentication() {
        let mut registry = Registry::new();
        registry
            .register_policy(
                "ownerOnly",
                policy_fn("ownerOnly", |ctx| {
                    let sub = ctx.auth.claims.as_ref().and_then(|c| c.sub.clone());
                    if sub.as_deref() == ctx.params.get("owner").map(String::as_str) {
                        Ok(Flow::Continue(()))
                    } else {
                        Ok(Flow::stop(StatusCode::FORBIDDEN, json!({"message": "not yours"})))
                    }
                }),
            )
            .register_policy("broken", policy_fn("broken", |_| Err(HandlerError::message("boom"))));

        let auth = table(json!({"auth": {"GET": {"policies": ["ownerOnly"]}, "DELETE": {"policies": "broken"}}}), &registry);

        let mut allowed = request(HttpMethod::Get, Some(&token(&[])));
        allowed.params.insert("owner".into(), "u1".into());
        assert!(matches!(gate().authorize(&auth, allowed).await, GateDecision::Authorized(_)));

        let mut denied = request(HttpMethod::Get, Some(&token(&[])));
        denied.params.insert("owner".into(), "u2".into());
        assert_eq!(
            gate().authorize(&auth, denied).await,
            GateDecision::Rejected(Stop::new(StatusCode::FORBIDDEN, json!({"message": "not yours"})))
        );

        assert_eq!(
            gate().authorize(&auth, request(HttpMethod::Delete, Some(&token(&[])))).await,
            GateDecision::Rejected(Stop::internal())
        );
    }
}
