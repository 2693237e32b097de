//! Resolves a requested `(domain, path)` against the index.
//!
//! The domain is always expanded to its candidates. The path is interpreted
//! through [`PathScope`]:
//! - no path (or an empty one) matches every path under a domain;
//! - exactly `/` matches only the `/` bucket;
//! - anything else matches each of its ancestor paths.

use crate::cookies::{CandidateGenerator, Cookie, CookieIndex, DomainBucket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathScope {
    AllPaths,
    Root,
    Candidates(Vec<String>),
}

impl PathScope {
    pub fn resolve(path: Option<&str>, generator: &dyn CandidateGenerator) -> Self {
        match path {
            None | Some("") => PathScope::AllPaths,
            Some("/") => PathScope::Root,
            Some(path) => {
                let candidates = generator.path_candidates(path);
                if candidates.is_empty() {
                    PathScope::Candidates(vec![path.to_string()])
                } else {
                    PathScope::Candidates(candidates)
                }
            }
        }
    }

    fn collect_from(&self, paths: &DomainBucket, results: &mut Vec<Cookie>) {
        match self {
            PathScope::AllPaths => {
                results.extend(paths.values().flat_map(|names| names.values()).cloned());
            }
            PathScope::Root => {
                if let Some(names) = paths.get("/") {
                    results.extend(names.values().cloned());
                }
            }
            PathScope::Candidates(candidates) => {
                for names in candidates.iter().filter_map(|path| paths.get(path)) {
                    results.extend(names.values().cloned());
                }
            }
        }
    }
}

/// Every cookie visible to a request for `domain` and `path`.
///
/// Returns nothing for an empty domain. Results are grouped per domain candidate,
/// in the order the generator yields them.
pub fn match_cookies(
    index: &CookieIndex,
    generator: &dyn CandidateGenerator,
    domain: &str,
    path: Option<&str>,
) -> Vec<Cookie> {
    if domain.is_empty() {
        return vec![];
    }

    let scope = PathScope::resolve(path, generator);
    let mut domains = generator.domain_candidates(domain);
    if domains.is_empty() {
        domains.push(domain.to_string());
    }

    let mut results = Vec::new();
    for paths in domains.iter().filter_map(|candidate| index.domain(candidate)) {
        scope.collect_from(paths, &mut results);
    }

    log::trace!("matched {} cookie(s) for {domain} {path:?}", results.len());
    results
}
