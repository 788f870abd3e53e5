use std::fmt;
use std::sync::Arc;

use crate::model::{AuthMethod, HttpMethod};
use crate::pipeline::{AuthenticationPolicy, Policy};

/// A resolved authorization requirement for one method
#[derive(Clone)]
pub struct Requirement {
    pub requires_auth: bool,
    /// `None` is the `requiresRoles: false` shape
    pub requires_roles: Option<Vec<String>>,
    /// Built-in authentication first, then the declared policies in order
    pub policies: Vec<Arc<dyn Policy>>,
}

impl Requirement {
    pub fn new(requires_auth: bool, requires_roles: Option<Vec<String>>) -> Self {
        Self {
            requires_auth,
            requires_roles,
            policies: vec![Arc::new(AuthenticationPolicy)],
        }
    }

    /// Anonymous access (`true`)
    pub fn open() -> Self {
        Self::new(false, None)
    }

    /// Any authenticated caller; the root default
    pub fn authenticated() -> Self {
        Self::new(true, None)
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.requires_auth == other.requires_auth
            && self.requires_roles == other.requires_roles
            && self.policy_names() == other.policy_names()
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirement")
            .field("requires_auth", &self.requires_auth)
            .field("requires_roles", &self.requires_roles)
            .field("policies", &self.policy_names())
            .finish()
    }
}

/// One slot of an auth table: a requirement, or the method is forbidden
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEntry {
    Forbidden,
    Required(Requirement),
}

impl AuthEntry {
    pub fn requirement(&self) -> Option<&Requirement> {
        match self {
            AuthEntry::Forbidden => None,
            AuthEntry::Required(requirement) => Some(requirement),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthEntry::Forbidden)
    }
}

/// Complete table: exactly one entry per HTTP method plus `realTime`.
/// Being a fixed-size array, it cannot be sparse.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTable {
    entries: [AuthEntry; AuthMethod::COUNT],
}

impl AuthTable {
    pub fn uniform(entry: AuthEntry) -> Self {
        Self {
            entries: std::array::from_fn(|_| entry.clone()),
        }
    }

    /// Root default: authentication required, no roles
    pub fn root_default() -> Self {
        Self::uniform(AuthEntry::Required(Requirement::authenticated()))
    }

    pub fn get(&self, method: impl Into<AuthMethod>) -> &AuthEntry {
        &self.entries[method.into().index()]
    }

    pub fn set(&mut self, method: AuthMethod, entry: AuthEntry) {
        self.entries[method.index()] = entry;
    }

    /// Assign one entry to a group of methods
    pub fn apply(&mut self, methods: &[AuthMethod], entry: &AuthEntry) {
        for method in methods {
            self.set(*method, entry.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuthMethod, &AuthEntry)> {
        AuthMethod::ALL.into_iter().map(move |method| (method, self.get(method)))
    }

    /// HTTP methods whose entry is not forbidden, for the `Allow` header
    pub fn allowed_methods(&self) -> Vec<HttpMethod> {
        HttpMethod::ALL
            .into_iter()
            .filter(|method| !self.get(*method).is_forbidden())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_default_requires_auth_everywhere() {
        let table = AuthTable::root_default();
        assert_eq!(table.iter().count(), 8);
        for (_, entry) in table.iter() {
            assert_eq!(entry, &AuthEntry::Required(Requirement::new(true, None)));
        }
    }

    #[test]
    fn allowed_methods_skip_forbidden() {
        let mut table = AuthTable::root_default();
        table.set(AuthMethod::Http(HttpMethod::Get), AuthEntry::Forbidden);
        table.set(AuthMethod::RealTime, AuthEntry::Forbidden);
        let allowed = table.allowed_methods();
        assert!(!allowed.contains(&HttpMethod::Get));
        assert_eq!(allowed.len(), 6);
    }

    #[test]
    fn builtin_policy_is_first() {
        assert_eq!(Requirement::open().policy_names(), vec!["authenticate"]);
    }
}
