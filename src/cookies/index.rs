//! The in-memory cookie index.
//!
//! Cookies are kept in three nested maps, `domain -> path -> name -> cookie`,
//! keyed by the exact strings stored on the cookie. A missing domain or path
//! bucket behaves exactly like an empty one. Empty buckets are pruned on
//! removal so the persisted form never carries them.

use std::collections::HashMap;

use serde::Serialize;

use crate::cookies::Cookie;

/// Cookies stored under one path, by name.
pub type PathBucket = HashMap<String, Cookie>;

/// Path buckets stored under one domain, by path.
pub type DomainBucket = HashMap<String, PathBucket>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CookieIndex {
    domains: HashMap<String, DomainBucket>,
}

impl CookieIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact lookup; no domain or path matching is applied.
    pub fn get(&self, domain: &str, path: &str, name: &str) -> Option<&Cookie> {
        self.domains.get(domain)?.get(path)?.get(name)
    }

    pub fn domain(&self, domain: &str) -> Option<&DomainBucket> {
        self.domains.get(domain)
    }

    /// Inserts `cookie` at its own `(domain, path, name)`, returning the cookie it replaced.
    pub fn insert(&mut self, cookie: Cookie) -> Option<Cookie> {
        self.domains
            .entry(cookie.domain.clone())
            .or_default()
            .entry(cookie.path.clone())
            .or_default()
            .insert(cookie.name.clone(), cookie)
    }

    pub fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        let paths = self.domains.get_mut(domain)?;
        let names = paths.get_mut(path)?;
        let removed = names.remove(name);

        if names.is_empty() {
            paths.remove(path);
        }
        if paths.is_empty() {
            self.domains.remove(domain);
        }

        removed
    }

    /// Removes every cookie stored under exactly `domain` and `path`.
    pub fn remove_path(&mut self, domain: &str, path: &str) -> Option<PathBucket> {
        let paths = self.domains.get_mut(domain)?;
        let removed = paths.remove(path);

        if paths.is_empty() {
            self.domains.remove(domain);
        }

        removed
    }

    /// Removes every cookie stored under exactly `domain`, whatever its path.
    pub fn remove_domain(&mut self, domain: &str) -> Option<DomainBucket> {
        self.domains.remove(domain)
    }

    pub fn clear(&mut self) {
        self.domains.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> + '_ {
        self.domains
            .values()
            .flat_map(|paths| paths.values())
            .flat_map(|names| names.values())
    }

    pub fn len(&self) -> usize {
        self.domains
            .values()
            .flat_map(|paths| paths.values())
            .map(|names| names.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Domains and the paths under each, for diagnostics.
    pub(crate) fn outline(&self) -> impl Iterator<Item = (&String, &DomainBucket)> + '_ {
        self.domains.iter()
    }
}

impl FromIterator<Cookie> for CookieIndex {
    fn from_iter<I: IntoIterator<Item = Cookie>>(iter: I) -> Self {
        let mut index = CookieIndex::new();
        for cookie in iter {
            index.insert(cookie);
        }
        index
    }
}
