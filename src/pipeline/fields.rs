// Field-level redaction driven by per-field auth tables

use serde_json::Value;

use crate::auth::{satisfies, AuthContext};
use crate::compiler::{AuthEntry, AuthTable};
use crate::model::AuthMethod;

/// Field policies are not run here; only the requirement shape is checked.
pub fn field_allowed(table: &AuthTable, method: AuthMethod, auth: &AuthContext) -> bool {
    match table.get(method) {
        AuthEntry::Forbidden => false,
        AuthEntry::Required(requirement) => {
            !requirement.requires_auth
                || (auth.is_authenticated && satisfies(requirement.requires_roles.as_deref(), &auth.roles))
        }
    }
}

/// Remove denied fields from an object, a list of objects, or a
/// `{documents: [...]}` page. Returns the removed field names.
pub fn redact(value: &mut Value, fields: &[(String, AuthTable)], method: AuthMethod, auth: &AuthContext) -> Vec<String> {
    if fields.is_empty() {
        return Vec::new();
    }

    let denied: Vec<&str> = fields
        .iter()
        .filter(|(_, table)| !field_allowed(table, method, auth))
        .map(|(name, _)| name.as_str())
        .collect();

    if denied.is_empty() {
        return Vec::new();
    }

    let mut removed = Vec::new();
    strip(value, &denied, &mut removed);
    removed.sort();
    removed.dedup();
    removed
}

fn strip(value: &mut Value, denied: &[&str], removed: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                strip(item, denied, removed);
            }
        }
        Value::Object(map) => {
            for name in denied {
                if map.shift_remove(*name).is_some() {
                    removed.push(name.to_string());
                }
            }
            if let Some(documents) = map.get_mut("documents") {
                if documents.is_array() {
                    strip(documents, denied, removed);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::compiler::Compiler;
    use crate::model::HttpMethod;
    use crate::registry::Registry;
    use serde_json::json;

    fn fields() -> Vec<(String, AuthTable)> {
        let registry = Registry::new();
        let model = Compiler::new(&registry)
            .compile_value(&json!({
                "auth": {
                    "read": true,
                    "fields": {
                        "email": {"read": {"requiresRoles": ["admin"]}},
                        "secret": false
                    }
                }
            }))
            .unwrap();
        model.root.fields.clone()
    }

    fn admin() -> AuthContext {
        AuthContext::authenticated("t".into(), Claims::new(None, vec!["admin".into()], 1))
    }

    #[test]
    fn anonymous_reader_loses_protected_fields() {
        let mut body = json!({"name": "a", "email": "a@x", "secret": 1});
        let removed = redact(&mut body, &fields(), HttpMethod::Get.into(), &AuthContext::anonymous());
        assert_eq!(body, json!({"name": "a"}));
        assert_eq!(removed, vec!["email".to_string(), "secret".to_string()]);
    }

    #[test]
    fn admin_keeps_role_gated_field() {
        let mut body = json!([{"name": "a", "email": "a@x", "secret": 1}]);
        redact(&mut body, &fields(), HttpMethod::Get.into(), &admin());
        assert_eq!(body, json!([{"name": "a", "email": "a@x"}]));
    }

    #[test]
    fn pages_are_redacted_per_document() {
        let mut body = json!({"documents": [{"email": "a@x"}, {"email": "b@x", "id": "2"}], "count": 2});
        redact(&mut body, &fields(), HttpMethod::Get.into(), &AuthContext::anonymous());
        assert_eq!(body, json!({"documents": [{}, {"id": "2"}], "count": 2}));
    }
}
