//! Persisted, in-process HTTP cookie cache.
//!
//! Cookies live in memory in a three level index (`domain -> path -> name`) and
//! are mirrored, as one document, to a durable [`repository`]. See
//! [`store::CookieCache`] for the public contract.

pub mod config;
pub mod cookies;
pub mod errors;
pub mod repository;
pub mod store;

pub use config::{CookieCacheConfig, Durability};
pub use cookies::Cookie;
pub use errors::CookieCacheError;
pub use store::CookieCache;
