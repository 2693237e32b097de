//! Domain and path candidate generation used when matching cookies.
//!
//! For a request to `www.example.com/a/b` the cookies that apply may live under
//! any ancestor domain and any ancestor path. A [`CandidateGenerator`] lists
//! those ancestors; the matcher only looks up buckets for what it yields.

use url::Host;

pub trait CandidateGenerator: Send + Sync {
    /// Ancestor domains of `domain`, the domain itself included.
    ///
    /// An empty result means the generator has no opinion; callers then use the
    /// literal domain on its own.
    fn domain_candidates(&self, domain: &str) -> Vec<String>;

    /// Ancestor paths of `path`, the path itself included.
    fn path_candidates(&self, path: &str) -> Vec<String>;
}

/// Default generator, bounded by the public suffix list.
///
/// - Domains yield the registrable domain (`example.co.uk`) and every longer
///   suffix up to the full host (`www.example.co.uk`). Public suffixes such as
///   `co.uk` are never candidates. A host that is itself a public suffix, a
///   single label host or an IP literal yields nothing.
/// - Paths yield the path and each parent directory, ending in `/`:
///   `/a/b/c`, `/a/b`, `/a`, `/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicSuffixCandidates;

impl CandidateGenerator for PublicSuffixCandidates {
    fn domain_candidates(&self, domain: &str) -> Vec<String> {
        let domain = domain.trim_start_matches('.');
        if domain.is_empty() || domain.split('.').any(str::is_empty) {
            return vec![];
        }
        if matches!(Host::parse(domain), Ok(Host::Ipv4(_) | Host::Ipv6(_))) {
            return vec![];
        }

        // The list is lowercase; ASCII lowercasing keeps byte offsets, so the
        // candidates are sliced from the domain as given.
        let lowered = domain.to_ascii_lowercase();
        let Some(registrable) = psl::domain_str(&lowered) else {
            return vec![];
        };

        let base = domain.len() - registrable.len();
        let mut candidates = vec![domain[base..].to_string()];
        let mut start = base;
        while start > 0 {
            // `start - 1` is the dot in front of the current candidate.
            start = domain[..start - 1].rfind('.').map_or(0, |dot| dot + 1);
            candidates.push(domain[start..].to_string());
        }

        candidates
    }

    fn path_candidates(&self, path: &str) -> Vec<String> {
        if path == "/" {
            return vec!["/".to_string()];
        }

        let mut candidates = vec![path.to_string()];
        let mut current = path;
        while current.len() > 1 {
            match current.rfind('/') {
                Some(0) | None => break,
                Some(idx) => {
                    current = &current[..idx];
                    candidates.push(current.to_string());
                }
            }
        }
        candidates.push("/".to_string());

        candidates
    }
}
