// Tagged declarations parsed from a raw endpoint tree
//
// The raw tree is duck-typed JSON: a key may be a shortcut, a method, a
// child path or a setting. Parsing resolves that once, so the compiler only
// ever sees explicit variants.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::method::{AuthMethod, HttpMethod};

#[derive(Debug, Error)]
pub enum DeclError {
    #[error("endpoint '{path}' must be an object")]
    InvalidNode { path: String },

    #[error("endpoint '{path}': '{key}' must be a name or a list of names")]
    InvalidHandlerList { path: String, key: String },

    #[error("endpoint '{path}': '{key}' must be an object")]
    InvalidSection { path: String, key: String },

    #[error("endpoint '{path}': invalid cors settings: {source}")]
    InvalidCors {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One authorization declaration before compilation
#[derive(Debug, Clone, PartialEq)]
pub enum RequirementDecl {
    /// `false`: the method is forbidden entirely
    Deny,
    /// `true`: open to anonymous callers
    Open,
    Rules {
        requires_auth: Option<bool>,
        requires_roles: Option<Vec<String>>,
        policies: Vec<String>,
    },
    /// Anything else. Compiles to a forbidden entry.
    Malformed(String),
}

impl RequirementDecl {
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Bool(false) => RequirementDecl::Deny,
            Value::Bool(true) => RequirementDecl::Open,
            Value::Object(map) => Self::parse_rules(map),
            other => RequirementDecl::Malformed(format!("expected boolean or object, got {}", other)),
        }
    }

    fn parse_rules(map: &Map<String, Value>) -> Self {
        let requires_auth = match map.get("requiresAuth") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(*flag),
            Some(other) => {
                return RequirementDecl::Malformed(format!("requiresAuth must be a boolean, got {}", other))
            }
        };

        let requires_roles = match map.get("requiresRoles") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(value) => match name_list(value) {
                Some(roles) => Some(roles),
                None => {
                    return RequirementDecl::Malformed(format!(
                        "requiresRoles must be false or a list of roles, got {}",
                        value
                    ))
                }
            },
        };

        let policies = match map.get("policies") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => match name_list(value) {
                Some(policies) => policies,
                None => {
                    return RequirementDecl::Malformed(format!("policies must be a list of names, got {}", value))
                }
            },
        };

        RequirementDecl::Rules {
            requires_auth,
            requires_roles,
            policies,
        }
    }
}

/// A group-level or method-level authorization declaration
#[derive(Debug, Clone, PartialEq)]
pub enum AuthShortcut {
    Common(RequirementDecl),
    Read(RequirementDecl),
    Write(RequirementDecl),
    Method(AuthMethod, RequirementDecl),
}

/// Everything declared under a node's `auth` key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthDecl {
    pub shortcuts: Vec<AuthShortcut>,
    pub fields: Vec<(String, AuthDecl)>,
}

const COMMON_KEYS: [&str; 3] = ["requiresAuth", "requiresRoles", "policies"];

impl AuthDecl {
    pub fn parse(value: &Value, path: &str) -> Self {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Self {
                    shortcuts: vec![AuthShortcut::Common(RequirementDecl::parse(other))],
                    fields: Vec::new(),
                }
            }
        };

        let mut decl = AuthDecl::default();

        if COMMON_KEYS.iter().any(|key| map.contains_key(*key)) {
            let common: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| COMMON_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            decl.shortcuts
                .push(AuthShortcut::Common(RequirementDecl::parse(&Value::Object(common))));
        }

        for (key, value) in map {
            match key.as_str() {
                key if COMMON_KEYS.contains(&key) => {}
                "read" => decl.shortcuts.push(AuthShortcut::Read(RequirementDecl::parse(value))),
                "write" => decl.shortcuts.push(AuthShortcut::Write(RequirementDecl::parse(value))),
                "fields" => match value {
                    Value::Object(fields) => {
                        for (field, field_value) in fields {
                            decl.fields
                                .push((field.clone(), AuthDecl::parse(field_value, path)));
                        }
                    }
                    other => tracing::warn!(
                        "Endpoint '{}': ignoring auth.fields, expected an object but got {}",
                        path,
                        other
                    ),
                },
                other => match AuthMethod::parse(other) {
                    Some(method) => decl
                        .shortcuts
                        .push(AuthShortcut::Method(method, RequirementDecl::parse(value))),
                    None => tracing::warn!("Endpoint '{}': ignoring unknown auth key '{}'", path, other),
                },
            }
        }

        decl
    }
}

/// Handler/filter names declared for a group or a single method
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerShortcut {
    Read(Vec<String>),
    Write(Vec<String>),
    Method(HttpMethod, Vec<String>),
}

fn parse_handler_map(value: &Value, path: &str, section: &str) -> Result<Vec<HandlerShortcut>, DeclError> {
    let map = value.as_object().ok_or_else(|| DeclError::InvalidSection {
        path: path.to_string(),
        key: section.to_string(),
    })?;

    let mut shortcuts = Vec::new();
    for (key, value) in map {
        let names = name_list(value).ok_or_else(|| DeclError::InvalidHandlerList {
            path: path.to_string(),
            key: format!("{}.{}", section, key),
        })?;

        match key.as_str() {
            "read" => shortcuts.push(HandlerShortcut::Read(names)),
            "write" => shortcuts.push(HandlerShortcut::Write(names)),
            other => match HttpMethod::parse(other) {
                Some(method) => shortcuts.push(HandlerShortcut::Method(method, names)),
                None => tracing::warn!("Endpoint '{}': ignoring unknown {} key '{}'", path, section, other),
            },
        }
    }
    Ok(shortcuts)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeDecl {
    pub connect: Vec<String>,
    pub message: Vec<String>,
    pub disconnect: Vec<String>,
}

impl RealtimeDecl {
    fn parse(value: &Value, path: &str) -> Result<Self, DeclError> {
        let map = value.as_object().ok_or_else(|| DeclError::InvalidSection {
            path: path.to_string(),
            key: "realTime".to_string(),
        })?;

        let list = |key: &str| -> Result<Vec<String>, DeclError> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(value) => name_list(value).ok_or_else(|| DeclError::InvalidHandlerList {
                    path: path.to_string(),
                    key: format!("realTime.{}", key),
                }),
            }
        };

        Ok(Self {
            connect: list("connect")?,
            message: list("message")?,
            disconnect: list("disconnect")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.message.is_empty() && self.disconnect.is_empty()
    }
}

/// `origin` accepts `true` (any), a single origin or a list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OriginDecl {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

/// Partial CORS settings; unset fields inherit from the parent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsDecl {
    pub origin: Option<OriginDecl>,
    pub methods: Option<Vec<String>>,
    pub allowed_headers: Option<Vec<String>>,
    pub exposed_headers: Option<Vec<String>>,
    pub credentials: Option<bool>,
    pub max_age: Option<u64>,
}

/// A raw endpoint node after parsing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointDecl {
    pub auth: AuthDecl,
    pub cors: Option<CorsDecl>,
    pub handlers: Vec<HandlerShortcut>,
    pub filters: Vec<HandlerShortcut>,
    pub real_time: RealtimeDecl,
    pub collection: Option<String>,
    pub children: Vec<(String, EndpointDecl)>,
}

impl EndpointDecl {
    /// Parse a whole tree. `path` is only used for diagnostics.
    pub fn parse(value: &Value, path: &str) -> Result<Self, DeclError> {
        let map = value.as_object().ok_or_else(|| DeclError::InvalidNode {
            path: path.to_string(),
        })?;

        let mut decl = EndpointDecl::default();

        for (key, value) in map {
            if key.starts_with('/') {
                let child_path = join_path(path, key);
                decl.children
                    .push((key.clone(), EndpointDecl::parse(value, &child_path)?));
                continue;
            }

            match key.as_str() {
                "auth" => decl.auth = AuthDecl::parse(value, path),
                "cors" => {
                    let cors = CorsDecl::deserialize(value).map_err(|source| DeclError::InvalidCors {
                        path: path.to_string(),
                        source,
                    })?;
                    decl.cors = Some(cors);
                }
                "handlers" => decl.handlers = parse_handler_map(value, path, "handlers")?,
                "filters" => decl.filters = parse_handler_map(value, path, "filters")?,
                "realTime" => decl.real_time = RealtimeDecl::parse(value, path)?,
                "collection" => match value.as_str() {
                    Some(name) => decl.collection = Some(name.to_string()),
                    None => {
                        return Err(DeclError::InvalidSection {
                            path: path.to_string(),
                            key: "collection".to_string(),
                        })
                    }
                },
                other => tracing::warn!("Endpoint '{}': ignoring unknown key '{}'", path, other),
            }
        }

        Ok(decl)
    }
}

/// Join a parent path and a child key without doubling the separator
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() || parent == "/" {
        key.to_string()
    } else {
        format!("{}{}", parent.trim_end_matches('/'), key)
    }
}

/// A single name or a list of names. Legacy `::name` references are accepted.
fn name_list(value: &Value) -> Option<Vec<String>> {
    let strip = |name: &str| name.strip_prefix("::").unwrap_or(name).to_string();
    match value {
        Value::String(name) => Some(vec![strip(name)]),
        Value::Array(items) => items.iter().map(|item| item.as_str().map(strip)).collect(),
        _ => None,
    }
}
