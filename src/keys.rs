//! Cache key derivation.
//!
//! A request is identified by `(identity, normalized URL)` and a query string
//! is hashed separately, so one URL holds multiple cached variants (one per
//! distinct query string) under a single top-level entry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use url::Url;

/// Sentinel id used for unauthenticated viewers.
pub const ANONYMOUS_ID: u64 = 0;

/// The principal a cached page was rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Anonymous,
    User(u64),
}

impl Identity {
    pub fn id(self) -> u64 {
        match self {
            Identity::Anonymous => ANONYMOUS_ID,
            Identity::User(id) => id,
        }
    }

    pub fn is_anonymous(self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

/// Top-level key for a `(identity, normalized URL)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(pub u64);

/// Second-level key for one query-string variant under a [`RequestKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey(pub u64);

/// Compute a hash for any hashable value.
///
/// Non-cryptographic and cheap; collisions are an accepted tradeoff of the
/// checksum width. This is a cache key, not a security boundary.
fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Derive the top-level key for a principal and a normalized URL.
///
/// Pure and deterministic; malformed input simply hashes to some value.
pub fn derive_request_key(identity: &Identity, normalized_url: &str) -> RequestKey {
    RequestKey(hash_value(&(identity.id(), normalized_url)))
}

/// Derive the variant key for a raw query string (empty string for none).
pub fn derive_query_key(query: &str) -> QueryKey {
    QueryKey(hash_value(&query))
}

/// Normalize a host + request path into the canonical URL form used for
/// key derivation: query stripped, trailing slash removed.
pub fn normalized_request_url(host: &str, path: &str) -> String {
    format!("{host}{}", path.trim_end_matches('/'))
}

/// Normalize a full URL the same way [`normalized_request_url`] normalizes a
/// live request, so invalidation derives the same keys capture did.
pub fn normalize_url(url: &Url) -> String {
    normalized_request_url(url.host_str().unwrap_or(""), url.path())
}
