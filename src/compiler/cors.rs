use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};

use crate::model::decl::{CorsDecl, OriginDecl};

#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigin {
    Any,
    List(Vec<String>),
}

/// Resolved CORS settings of a compiled node
#[derive(Debug, Clone, PartialEq)]
pub struct CorsOptions {
    pub origin: CorsOrigin,
    pub methods: Vec<String>,
    /// `None` mirrors whatever the preflight asks for
    pub allowed_headers: Option<Vec<String>>,
    pub exposed_headers: Vec<String>,
    pub credentials: bool,
    pub max_age: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: CorsOrigin::Any,
            methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: None,
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: None,
        }
    }
}

impl CorsOptions {
    /// Global default from the configured origin list (`*` means any)
    pub fn from_origins(origins: &[String]) -> Self {
        let origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigin::Any
        } else {
            CorsOrigin::List(origins.to_vec())
        };
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Overlay a node's declaration on top of the inherited settings
    pub fn merged_with(&self, decl: &CorsDecl) -> Self {
        let mut out = self.clone();
        if let Some(origin) = &decl.origin {
            out.origin = match origin {
                OriginDecl::Flag(true) => CorsOrigin::Any,
                OriginDecl::Flag(false) => CorsOrigin::List(Vec::new()),
                OriginDecl::One(o) if o == "*" => CorsOrigin::Any,
                OriginDecl::One(o) => CorsOrigin::List(vec![o.clone()]),
                OriginDecl::Many(list) => CorsOrigin::List(list.clone()),
            };
        }
        if let Some(methods) = &decl.methods {
            out.methods = methods.clone();
        }
        if let Some(headers) = &decl.allowed_headers {
            out.allowed_headers = Some(headers.clone());
        }
        if let Some(headers) = &decl.exposed_headers {
            out.exposed_headers = headers.clone();
        }
        if let Some(credentials) = decl.credentials {
            out.credentials = credentials;
        }
        if let Some(max_age) = decl.max_age {
            out.max_age = Some(max_age);
        }
        out
    }

    /// Build the tower-http layer. Wildcards turn into request mirroring when
    /// credentials are allowed, since browsers reject `*` with credentials.
    pub fn layer(&self) -> CorsLayer {
        let mut layer = CorsLayer::new().allow_credentials(self.credentials);

        layer = match &self.origin {
            CorsOrigin::Any if self.credentials => layer.allow_origin(AllowOrigin::mirror_request()),
            CorsOrigin::Any => layer.allow_origin(Any),
            CorsOrigin::List(origins) => {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|o| match HeaderValue::from_str(o) {
                        Ok(value) => Some(value),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                            None
                        }
                    })
                    .collect();
                layer.allow_origin(origins)
            }
        };

        let methods: Vec<Method> = self
            .methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect();
        layer = layer.allow_methods(methods);

        layer = match &self.allowed_headers {
            Some(headers) => layer.allow_headers(header_names(headers)),
            None if self.credentials => layer.allow_headers(AllowHeaders::mirror_request()),
            None => layer.allow_headers(Any),
        };

        layer = layer.expose_headers(header_names(&self.exposed_headers));

        if let Some(max_age) = self.max_age {
            layer = layer.max_age(Duration::from_secs(max_age));
        }

        layer
    }
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect()
}
