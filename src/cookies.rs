//! Cookies: the [`Cookie`] record, the [`CookieIndex`] cache, its codec and the
//! domain/path matcher.

mod candidates;
pub mod codec;
mod cookie;
mod index;
mod matcher;

pub use candidates::CandidateGenerator;
pub use candidates::PublicSuffixCandidates;

pub use cookie::Cookie;

pub use index::CookieIndex;
pub use index::DomainBucket;
pub use index::PathBucket;

pub use matcher::match_cookies;
pub use matcher::PathScope;
