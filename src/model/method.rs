use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven HTTP methods an endpoint node can declare handlers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Methods covered by the `read` handler shortcut
    pub const READ: [HttpMethod; 3] = [HttpMethod::Get, HttpMethod::Head, HttpMethod::Options];

    /// Methods covered by the `write` handler shortcut
    pub const WRITE: [HttpMethod; 4] = [HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete];

    /// Parse a declaration key. Keys are case-sensitive upper case, so `get`
    /// is never confused with a method.
    pub fn parse(key: &str) -> Option<Self> {
        HttpMethod::ALL.into_iter().find(|m| m.as_str() == key)
    }

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        HttpMethod::parse(method.as_str())
    }

    /// Read-class methods run handlers before filters; write-class methods
    /// run filters first.
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a compiled auth table: every HTTP method plus the `realTime`
/// pseudo-method guarding channel subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Http(HttpMethod),
    RealTime,
}

impl AuthMethod {
    pub const COUNT: usize = 8;

    pub const ALL: [AuthMethod; 8] = [
        AuthMethod::Http(HttpMethod::Get),
        AuthMethod::Http(HttpMethod::Head),
        AuthMethod::Http(HttpMethod::Options),
        AuthMethod::Http(HttpMethod::Post),
        AuthMethod::Http(HttpMethod::Put),
        AuthMethod::Http(HttpMethod::Patch),
        AuthMethod::Http(HttpMethod::Delete),
        AuthMethod::RealTime,
    ];

    /// Methods covered by the `read` shortcut
    pub const READ: [AuthMethod; 4] = [
        AuthMethod::Http(HttpMethod::Get),
        AuthMethod::Http(HttpMethod::Head),
        AuthMethod::Http(HttpMethod::Options),
        AuthMethod::RealTime,
    ];

    /// Methods covered by the `write` shortcut
    pub const WRITE: [AuthMethod; 4] = [
        AuthMethod::Http(HttpMethod::Post),
        AuthMethod::Http(HttpMethod::Put),
        AuthMethod::Http(HttpMethod::Patch),
        AuthMethod::Http(HttpMethod::Delete),
    ];

    pub fn parse(key: &str) -> Option<Self> {
        if key == "realTime" {
            return Some(AuthMethod::RealTime);
        }
        HttpMethod::parse(key).map(AuthMethod::Http)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Http(method) => method.as_str(),
            AuthMethod::RealTime => "realTime",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            AuthMethod::Http(method) => method.index(),
            AuthMethod::RealTime => 7,
        }
    }
}

impl From<HttpMethod> for AuthMethod {
    fn from(method: HttpMethod) -> Self {
        AuthMethod::Http(method)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(HttpMethod::parse("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("get"), None);
        assert_eq!(AuthMethod::parse("realTime"), Some(AuthMethod::RealTime));
        assert_eq!(AuthMethod::parse("realtime"), None);
    }

    #[test]
    fn indexes_cover_the_table() {
        let mut seen: Vec<usize> = AuthMethod::ALL.iter().map(AuthMethod::index).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..AuthMethod::COUNT).collect::<Vec<_>>());
    }
}
