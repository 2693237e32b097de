//! JSON codec for single cookies and for the whole index blob.
//!
//! The index is persisted as one JSON object, `{ domain: { path: { name: cookie } } }`.
//! Loading parses that generically first and then runs every leaf through the
//! cookie decoder; a leaf that fails aborts the whole load.

use std::collections::HashMap;

use serde_json::Value;

use crate::cookies::{Cookie, CookieIndex};
use crate::errors::{CookieCacheError, Result};

type RawIndex = HashMap<String, HashMap<String, HashMap<String, Value>>>;

pub fn encode_cookie(cookie: &Cookie) -> Result<String> {
    serde_json::to_string(cookie).map_err(CookieCacheError::Encode)
}

pub fn decode_cookie(text: &str) -> serde_json::Result<Cookie> {
    serde_json::from_str(text)
}

pub fn encode_index(index: &CookieIndex) -> Result<String> {
    serde_json::to_string(index).map_err(CookieCacheError::Encode)
}

pub fn decode_index(blob: &str) -> Result<CookieIndex> {
    let raw: Option<RawIndex> = serde_json::from_str(blob).map_err(CookieCacheError::MalformedIndex)?;
    let mut index = CookieIndex::new();

    for (domain, paths) in raw.unwrap_or_default() {
        for (path, names) in paths {
            for (name, leaf) in names {
                let cookie = decode_leaf(leaf).map_err(|source| CookieCacheError::CookieDecode {
                    domain: domain.clone(),
                    path: path.clone(),
                    name: name.clone(),
                    source,
                })?;

                if cookie.key() != (domain.as_str(), path.as_str(), name.as_str()) {
                    log::warn!(
                        "cookie stored at {domain}{path} {name} belongs to {}{} {}, re-indexing",
                        cookie.domain,
                        cookie.path,
                        cookie.name
                    );
                }
                index.insert(cookie);
            }
        }
    }

    Ok(index)
}

// Goes through the string form so every leaf hits the same decoder as `decode_cookie`.
fn decode_leaf(leaf: Value) -> serde_json::Result<Cookie> {
    decode_cookie(&leaf.to_string())
}
