//! Indexed storage strategy: a keyed store with native per-entry expiry.
//!
//! Pages and stats live in separate namespaces of the same expiring-map
//! abstraction. TTL enforcement is lazy: an expired entry is dropped the next
//! time it is read, which is the store's native expiry semantics.

use std::hash::Hash;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::compress;
use crate::config::CacheSettings;
use crate::error::CacheError;
use crate::keys::{self, Identity, RequestKey};

use super::{CacheEntry, CachedPage, PageStore, RequestContext};

struct Expiring<V> {
    value: V,
    expires_at: OffsetDateTime,
}

/// Keyed map with per-entry expiry, shared by the page and stats namespaces.
///
/// Atomic per-key store/remove from the engine's perspective; whole-value
/// last-writer-wins on insert.
pub(crate) struct ExpiringMap<K, V> {
    inner: DashMap<K, Expiring<V>>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let now = OffsetDateTime::now_utc();
        let expired = match self.inner.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
        };
        if expired {
            self.inner.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }

    pub(crate) fn insert(&self, key: K, value: V, ttl: Duration) {
        self.inner.insert(
            key,
            Expiring {
                value,
                expires_at: OffsetDateTime::now_utc() + ttl,
            },
        );
    }

    pub(crate) fn remove(&self, key: &K) {
        self.inner.remove(key);
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn clear(&self) {
        self.inner.clear();
    }

    /// Drop entries past their expiry without waiting for a read.
    pub(crate) fn purge_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.inner.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of live (unexpired) entries.
    pub(crate) fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.inner
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Snapshot of all live entries.
    pub(crate) fn entries(&self) -> Vec<(K, V)> {
        let now = OffsetDateTime::now_utc();
        self.inner
            .iter()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }
}

/// Indexed page store.
pub struct IndexedStore {
    pages: ExpiringMap<RequestKey, CacheEntry>,
    ttl: Duration,
    compress: bool,
    gzip_level: u32,
    max_entries: usize,
}

impl IndexedStore {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            pages: ExpiringMap::new(),
            ttl: settings.ttl(),
            compress: settings.compress,
            gzip_level: settings.gzip_level,
            max_entries: settings.max_entries,
        }
    }

    /// Number of live top-level entries (one per identity + URL pair).
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Snapshot every live entry with its key.
    pub fn list_all(&self) -> Vec<(RequestKey, CacheEntry)> {
        self.pages.entries()
    }
}

#[async_trait]
impl PageStore for IndexedStore {
    async fn lookup(&self, ctx: &RequestContext) -> Option<CachedPage> {
        let normalized = keys::normalized_request_url(&ctx.host, &ctx.path);
        let key = keys::derive_request_key(&ctx.identity, &normalized);
        let query_key = keys::derive_query_key(&ctx.query);
        self.pages
            .get(&key)
            .and_then(|entry| entry.get(&query_key).cloned())
    }

    async fn capture(
        &self,
        ctx: &RequestContext,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<(), CacheError> {
        let normalized = keys::normalized_request_url(&ctx.host, &ctx.path);
        let key = keys::derive_request_key(&ctx.identity, &normalized);
        let query_key = keys::derive_query_key(&ctx.query);

        let (stored_body, compressed) = if self.compress {
            let packed = compress::gzip(body, self.gzip_level)
                .map_err(|err| CacheError::write_failure(format!("gzip failed: {err}")))?;
            (Bytes::from(packed), true)
        } else {
            (Bytes::copy_from_slice(body), false)
        };

        // Merge the variant into the existing aggregate; the whole aggregate
        // gets a fresh TTL and last writer wins.
        let mut entry = self.pages.get(&key).unwrap_or_default();
        entry.insert(
            query_key,
            CachedPage {
                headers: headers.to_vec(),
                body: stored_body,
                compressed,
                request_uri: ctx.request_uri(),
            },
        );

        if !self.pages.contains(&key) {
            self.pages.purge_expired();
            if self.pages.len() >= self.max_entries {
                return Err(CacheError::store_unavailable(format!(
                    "indexed store at capacity ({} entries)",
                    self.max_entries
                )));
            }
        }

        self.pages.insert(key, entry, self.ttl);
        Ok(())
    }

    async fn expire_urls(&self, urls: &[Url], principals: &[Identity]) -> Result<(), CacheError> {
        for identity in principals {
            for url in urls {
                let key = keys::derive_request_key(identity, &keys::normalize_url(url));
                // Already-vanished entries are a no-op.
                self.pages.remove(&key);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.pages.clear();
        Ok(())
    }
}
