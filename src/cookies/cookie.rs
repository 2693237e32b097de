//! The cookie record stored in the cache.
//!
//! Only `domain`, `path` and `name` are interpreted by the cache; they form the
//! index key. Every other field is payload that is persisted and handed back
//! untouched. Attributes this type does not model are kept in
//! [`Cookie::extensions`] so they survive a save/load cycle.
//!
//! ```rust
//! use gosub_cookie_cache::cookies::Cookie;
//!
//! let c = Cookie {
//!     secure: true,
//!     http_only: true,
//!     same_site: Some("Lax".into()),                 // "Strict" | "Lax" | "None"
//!     expires: Some("2025-12-31T23:59:59Z".into()), // ISO 8601 recommended
//!     ..Cookie::new("example.com", "/", "session", "abc123")
//! };
//! assert_eq!(c.key(), ("example.com", "/", "session"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A cookie as stored/serialized by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name (case-sensitive). Serialized as `key`.
    #[serde(rename = "key", alias = "name")]
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    #[serde(default)]
    pub value: String,

    /// Domain the cookie is stored under, exactly as given (not normalized).
    pub domain: String,

    /// Path the cookie is stored under, exactly as given.
    pub path: String,

    /// Expiration timestamp. Session cookies have `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// If `true`, cookie is sent only over HTTPS.
    #[serde(default)]
    pub secure: bool,

    /// If `true`, cookie is not exposed to client-side scripts.
    #[serde(default)]
    pub http_only: bool,

    /// SameSite policy (`"Strict"`, `"Lax"` or `"None"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,

    /// Host-only flag; `None` when the producer did not decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,

    /// Attributes not modelled above, passed through as-is.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Cookie {
    /// Creates a session cookie with default flags.
    pub fn new(
        domain: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: path.into(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
            host_only: None,
            creation: None,
            last_accessed: None,
            extensions: Map::new(),
        }
    }

    /// The `(domain, path, name)` triple the cookie is indexed under.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.domain, &self.path, &self.name)
    }
}
