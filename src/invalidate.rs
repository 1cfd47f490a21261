//! Proactive invalidation on content mutation.
//!
//! Cached entries are keyed by identity, so a content change must expire the
//! entry for *every* known principal, not just the current viewer. The
//! fan-out is O(principals × urls) per invalidation; the principal set is
//! assumed bounded and enumerable. Very large user populations pay that cost
//! by design.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CacheError;
use crate::events::{InvalidationPlan, MutationEvent, SiteUrls};
use crate::keys::Identity;
use crate::stats::StatsTracker;
use crate::store::PageStore;

/// Enumerates the known principal ids for invalidation fan-out.
///
/// The anonymous sentinel is appended by the invalidator; implementations
/// only report real users.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn principal_ids(&self) -> Result<Vec<u64>, CacheError>;
}

/// Fixed principal set, for hosts with a static user table and for tests.
pub struct StaticPrincipalDirectory(pub Vec<u64>);

#[async_trait]
impl PrincipalDirectory for StaticPrincipalDirectory {
    async fn principal_ids(&self) -> Result<Vec<u64>, CacheError> {
        Ok(self.0.clone())
    }
}

pub struct Invalidator {
    store: Arc<dyn PageStore>,
    stats: Arc<StatsTracker>,
    principals: Arc<dyn PrincipalDirectory>,
    site: SiteUrls,
}

impl Invalidator {
    pub fn new(
        store: Arc<dyn PageStore>,
        stats: Arc<StatsTracker>,
        principals: Arc<dyn PrincipalDirectory>,
        site: SiteUrls,
    ) -> Self {
        Self {
            store,
            stats,
            principals,
            site,
        }
    }

    /// Expire the cache entries for the given URLs across every known
    /// principal plus anonymous. Idempotent; already-absent entries are
    /// no-ops.
    pub async fn invalidate(&self, urls: &[Url]) -> Result<(), CacheError> {
        let ids = match self.principals.principal_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                // Degrade to anonymous-only rather than leaving everything
                // stale; per-user entries will age out via TTL.
                warn!(
                    target = "staticcache::invalidate",
                    error = %err,
                    "principal directory unavailable, invalidating anonymous entries only"
                );
                Vec::new()
            }
        };

        let mut principals: Vec<Identity> = ids.into_iter().map(Identity::User).collect();
        principals.push(Identity::Anonymous);

        debug!(
            target = "staticcache::invalidate",
            urls = urls.len(),
            principals = principals.len(),
            "expiring cache entries"
        );
        self.store.expire_urls(urls, &principals).await
    }

    /// Translate a mutation event into the matching invalidation.
    pub async fn apply(&self, event: &MutationEvent) -> Result<(), CacheError> {
        match event.plan(&self.site) {
            InvalidationPlan::Urls(urls) => self.invalidate(&urls).await,
            InvalidationPlan::ClearAll => self.clear_all().await,
            InvalidationPlan::Nothing => Ok(()),
        }
    }

    /// Administrative full clear: every cache and stats entry goes.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.store.clear().await?;
        self.stats.clear();
        info!(target = "audit", "cleared page cache and stats");
        Ok(())
    }
}
