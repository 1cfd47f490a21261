//! Cache storage strategies.
//!
//! The engine stores only final rendered HTTP responses. Two interchangeable
//! strategies implement [`PageStore`]; the active one is chosen from
//! configuration by [`from_settings`] rather than branching in callers.

mod filesystem;
mod indexed;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::compress;
use crate::config::{CacheSettings, CacheStrategy};
use crate::error::CacheError;
use crate::keys::{Identity, QueryKey};

pub use filesystem::FilesystemStore;
pub use indexed::IndexedStore;
pub(crate) use indexed::ExpiringMap;

/// The request facts the store needs to place or find an entry.
///
/// Built once by the interceptor; stores never inspect the live request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
    pub host: String,
    /// Request path, query excluded.
    pub path: String,
    /// Raw query string, empty when absent.
    pub query: String,
    /// Whether the session carries the logged-in marker. The filesystem
    /// strategy never writes for authenticated principals.
    pub authenticated: bool,
}

impl RequestContext {
    /// Original request URI, kept on stored entries for diagnostics.
    pub fn request_uri(&self) -> String {
        if self.query.is_empty() {
            format!("{}{}", self.host, self.path)
        } else {
            format!("{}{}?{}", self.host, self.path, self.query)
        }
    }
}

/// One stored query-string variant of a page.
#[derive(Debug, Clone)]
pub struct CachedPage {
    /// Exact header set recorded at capture time, replayed verbatim on hit.
    pub headers: Vec<(String, String)>,
    /// Response body, gzipped when `compressed` is set.
    pub body: Bytes,
    pub compressed: bool,
    /// Original request URI, for diagnostics only.
    pub request_uri: String,
}

impl CachedPage {
    /// Body bytes ready to serve, decompressing when needed.
    pub fn decompressed_body(&self) -> Result<Bytes, CacheError> {
        if self.compressed {
            let raw = compress::gunzip(&self.body)
                .map_err(|err| CacheError::store_unavailable(format!("corrupt gzip body: {err}")))?;
            Ok(Bytes::from(raw))
        } else {
            Ok(self.body.clone())
        }
    }
}

/// All query variants cached for one `(identity, URL)` pair; the unit stored
/// under a single request key. Concurrent writers race on the whole
/// aggregate, last writer wins.
pub type CacheEntry = HashMap<QueryKey, CachedPage>;

/// Polymorphic interface over the two storage strategies.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Find a stored variant for this request. The filesystem strategy always
    /// misses here: its hits are served by the external router.
    async fn lookup(&self, ctx: &RequestContext) -> Option<CachedPage>;

    /// Persist a captured response for future requests. Must not alter the
    /// response already heading to the current viewer.
    async fn capture(
        &self,
        ctx: &RequestContext,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<(), CacheError>;

    /// Drop every entry for the given URLs. The indexed strategy fans out
    /// across the supplied principals; the filesystem strategy holds one
    /// shared file per URL and ignores them. Entries already gone are no-ops.
    async fn expire_urls(&self, urls: &[Url], principals: &[Identity]) -> Result<(), CacheError>;

    /// Drop everything.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Build the store selected by configuration.
pub fn from_settings(settings: &CacheSettings) -> Result<Arc<dyn PageStore>, CacheError> {
    match settings.strategy {
        CacheStrategy::Indexed => Ok(Arc::new(IndexedStore::new(settings))),
        CacheStrategy::Filesystem => Ok(Arc::new(FilesystemStore::new(settings)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uri_includes_query_when_present() {
        let ctx = RequestContext {
            identity: Identity::Anonymous,
            host: "example.com".to_string(),
            path: "/post/1".to_string(),
            query: "page=2".to_string(),
            authenticated: false,
        };
        assert_eq!(ctx.request_uri(), "example.com/post/1?page=2");

        let bare = RequestContext {
            query: String::new(),
            ..ctx
        };
        assert_eq!(bare.request_uri(), "example.com/post/1");
    }

    #[test]
    fn decompressed_body_round_trips() {
        let body = b"<html>cached</html>".to_vec();
        let page = CachedPage {
            headers: vec![],
            body: Bytes::from(compress::gzip(&body, 4).unwrap()),
            compressed: true,
            request_uri: "example.com/post/1".to_string(),
        };
        assert_eq!(page.decompressed_body().unwrap(), Bytes::from(body));
    }

    #[test]
    fn uncompressed_body_is_returned_as_is() {
        let page = CachedPage {
            headers: vec![],
            body: Bytes::from_static(b"plain"),
            compressed: false,
            request_uri: String::new(),
        };
        assert_eq!(page.decompressed_body().unwrap(), Bytes::from_static(b"plain"));
    }

    #[test]
    fn corrupt_compressed_body_degrades_to_error() {
        let page = CachedPage {
            headers: vec![],
            body: Bytes::from_static(b"not gzip"),
            compressed: true,
            request_uri: String::new(),
        };
        assert!(matches!(
            page.decompressed_body(),
            Err(CacheError::StoreUnavailable { .. })
        ));
    }
}
