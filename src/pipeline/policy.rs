use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;

use super::handler::HandlerError;
use super::{Flow, Stop};
use crate::auth::{extract_bearer, satisfies, AuthContext, AuthError, TokenVerifier};
use crate::error::ApiError;
use crate::model::HttpMethod;

/// Name of the built-in policy heading every compiled policy list
pub const AUTHENTICATE_POLICY: &str = "authenticate";

/// Mutable state a policy chain runs against
pub struct PolicyContext {
    pub method: HttpMethod,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub requires_auth: bool,
    pub requires_roles: Option<Vec<String>>,
    pub auth: AuthContext,
    verifier: Arc<dyn TokenVerifier>,
}

impl PolicyContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: HttpMethod,
        path: String,
        params: HashMap<String, String>,
        query: HashMap<String, String>,
        headers: HeaderMap,
        requires_auth: bool,
        requires_roles: Option<Vec<String>>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            method,
            path,
            params,
            query,
            headers,
            requires_auth,
            requires_roles,
            auth: AuthContext::anonymous(),
            verifier,
        }
    }

    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }
}

/// Pluggable authorization step
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &mut PolicyContext) -> Result<Flow<()>, HandlerError>;
}

/// Token and role check. Always first in a compiled policy list.
///
/// A bad token only clears the context; it rejects the request only when
/// the requirement demands authentication.
pub struct AuthenticationPolicy;

#[async_trait]
impl Policy for AuthenticationPolicy {
    fn name(&self) -> &str {
        AUTHENTICATE_POLICY
    }

    async fn check(&self, ctx: &mut PolicyContext) -> Result<Flow<()>, HandlerError> {
        ctx.auth = match extract_bearer(&ctx.headers) {
            Ok(token) => match ctx.verifier.verify(&token) {
                Ok(claims) => AuthContext::authenticated(token, claims),
                Err(e) => {
                    tracing::debug!("Token rejected for {} {}: {}", ctx.method, ctx.path, e);
                    AuthContext::rejected(Some(token))
                }
            },
            Err(AuthError::MissingHeader) => AuthContext::anonymous(),
            Err(e) => {
                tracing::debug!("Unusable Authorization header for {} {}: {}", ctx.method, ctx.path, e);
                AuthContext::anonymous()
            }
        };

        if ctx.requires_auth {
            if !ctx.auth.is_authenticated {
                return Ok(Flow::Stop(Stop::from_error(ApiError::unauthorized("Invalid token"))));
            }
            if !satisfies(ctx.requires_roles.as_deref(), &ctx.auth.roles) {
                return Ok(Flow::Stop(Stop::from_error(ApiError::unauthorized(
                    "Missing required role",
                ))));
            }
        }

        Ok(Flow::Continue(()))
    }
}

pub struct FnPolicy<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Policy for FnPolicy<F>
where
    F: Fn(&mut PolicyContext) -> Result<Flow<()>, HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &mut PolicyContext) -> Result<Flow<()>, HandlerError> {
        (self.f)(ctx)
    }
}

/// Wrap a synchronous closure as a named policy
pub fn policy_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Policy>
where
    F: Fn(&mut PolicyContext) -> Result<Flow<()>, HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnPolicy { name: name.into(), f })
}
