// Routing table for real-time namespaces, derived from the compiled tree

use regex::Regex;
use std::collections::HashMap;

use crate::compiler::{AuthEntry, CompiledNode, RealtimeHandlers};

#[derive(Debug, Clone)]
pub struct RealtimeRoute {
    /// Route pattern, e.g. `/todos/:id`
    pub path: String,
    pub pattern: Regex,
    pub auth: AuthEntry,
    pub handlers: RealtimeHandlers,
    pub param_names: Vec<String>,
    pub collection: Option<String>,
}

/// Ordered list of routes; first match wins
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<RealtimeRoute>,
}

impl RoutingTable {
    /// Depth-first, parent before children, children in declared order.
    /// Subtrees without any real-time handlers are skipped.
    pub fn build(root: &CompiledNode) -> Result<Self, regex::Error> {
        let mut routes = Vec::new();
        collect(root, &mut routes)?;

        tracing::debug!("Real-time routing table has {} routes", routes.len());
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[RealtimeRoute] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching a namespace and extract its parameters
    pub fn match_path(&self, namespace: &str) -> Option<(&RealtimeRoute, HashMap<String, String>)> {
        let namespace = normalize(namespace);

        self.routes.iter().find_map(|route| {
            let captures = route.pattern.captures(&namespace)?;
            let params = route
                .param_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| captures.get(i + 1).map(|m| (name.clone(), m.as_str().to_string())))
                .collect();
            Some((route, params))
        })
    }
}

fn collect(node: &CompiledNode, routes: &mut Vec<RealtimeRoute>) -> Result<(), regex::Error> {
    if !node.has_realtime {
        return Ok(());
    }

    let (pattern, param_names) = path_pattern(&node.path);
    routes.push(RealtimeRoute {
        path: node.path.clone(),
        pattern: Regex::new(&pattern)?,
        auth: node.auth.get(crate::model::AuthMethod::RealTime).clone(),
        handlers: node.real_time.clone(),
        param_names,
        collection: node.collection.clone(),
    });

    for child in &node.children {
        collect(child, routes)?;
    }
    Ok(())
}

/// Build an anchored regex for a route pattern. `:name` segments capture.
pub fn path_pattern(path: &str) -> (String, Vec<String>) {
    let mut pattern = String::from("^");
    let mut names = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');
        match segment.strip_prefix(':') {
            Some(name) => {
                pattern.push_str("([^/]+)");
                names.push(name.to_string());
            }
            None => pattern.push_str(&regex::escape(segment)),
        }
    }

    if names.is_empty() && pattern == "^" {
        pattern.push('/');
    }
    pattern.push('$');
    (pattern, names)
}

fn normalize(namespace: &str) -> String {
    let trimmed = namespace.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::realtime::realtime_fn;
    use crate::registry::Registry;
    use serde_json::json;

    fn table(raw: serde_json::Value) -> RoutingTable {
        let mut registry = Registry::new();
        registry.register_realtime("noop", realtime_fn(|data, _| Ok(data)));
        let model = Compiler::new(&registry).compile_value(&raw).unwrap();
        RoutingTable::build(&model.root).unwrap()
    }

    #[test]
    fn pattern_captures_params_in_order() {
        let (pattern, names) = path_pattern("/orgs/:org/todos/:id");
        assert_eq!(pattern, "^/orgs/([^/]+)/todos/([^/]+)$");
        assert_eq!(names, vec!["org".to_string(), "id".to_string()]);
        assert_eq!(path_pattern("/").0, "^/$");
    }

    #[test]
    fn literal_segments_are_escaped() {
        let (pattern, _) = path_pattern("/v1.0");
        assert_eq!(pattern, r"^/v1\.0$");
    }

    #[test]
    fn depth_first_declared_order() {
        let table = table(json!({
            "/a": {"realTime": {"connect": "noop"}, "/:id": {"realTime": {"message": "noop"}}},
            "/b": {"realTime": {"connect": "noop"}},
            "/quiet": {}
        }));
        let paths: Vec<&str> = table.routes().iter().map(|r| r.path.as_str()).collect();
        // root is kept because its subtree has handlers
        assert_eq!(paths, ["/", "/a", "/a/:id", "/b"]);
    }

    #[test]
    fn first_match_wins_and_extracts_params() {
        let table = table(json!({
            "/todos": {
                "realTime": {"connect": "noop"},
                "/:id": {"realTime": {"connect": "noop"}},
                "/mine": {"realTime": {"connect": "noop"}}
            }
        }));

        let (route, params) = table.match_path("/todos/42/").unwrap();
        assert_eq!(route.path, "/todos/:id");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        // declared after /:id, so /:id shadows it
        let (route, _) = table.match_path("todos/mine").unwrap();
        assert_eq!(route.path, "/todos/:id");

        assert!(table.match_path("/nothing").is_none());
    }

    #[test]
    fn route_carries_realtime_auth_entry() {
        let table = table(json!({
            "/feed": {"auth": {"realTime": false}, "realTime": {"connect": "noop"}}
        }));
        let (route, _) = table.match_path("/feed").unwrap();
        assert!(route.auth.is_forbidden());
    }
}
