//! StaticCache
//!
//! A full-page HTTP response cache that sits in front of a dynamic
//! content-generation pipeline. Requests are intercepted before they reach the
//! page renderer; a stored response is replayed when one is still valid, and
//! otherwise the final rendered output is captured for future reuse.
//!
//! Two interchangeable storage strategies:
//!
//! - **Indexed**: a keyed in-process store with native per-entry expiry. Hits
//!   are served by the [`middleware::page_cache_layer`] interceptor.
//! - **Filesystem**: rendered pages are written as plain files under a cache
//!   root so an external request router (rewrite rules) can serve hits without
//!   ever reaching the application. See [`rewrite`] for the router contract.
//!
//! ## Configuration
//!
//! Behavior is controlled via `staticcache.toml` (or `STATICCACHE__*`
//! environment variables):
//!
//! ```toml
//! strategy = "indexed"        # or "filesystem"
//! ttl_seconds = 86400
//! compress = true
//! ignore_list = ["/admin", "?nocache"]
//! # ... see config.rs for all options
//! ```
//!
//! The host application owns the HTTP server, the renderer, authentication,
//! and the scheduler; this crate only owns the cache. Content-mutation hooks
//! feed [`invalidate::Invalidator`], the scheduler periodically calls
//! [`gc::GarbageCollector`], and login/logout hooks use the [`session`]
//! cookie markers.

pub mod compress;
pub mod config;
pub mod error;
pub mod events;
pub mod gc;
pub mod invalidate;
pub mod keys;
pub mod middleware;
pub mod rewrite;
pub mod session;
pub mod stats;
pub mod store;
pub mod telemetry;

pub use config::{CacheSettings, CacheStrategy, GcInterval, LoggingSettings};
pub use error::CacheError;
pub use events::{MutationEvent, SiteUrls};
pub use gc::{GarbageCollector, SweepReport};
pub use invalidate::{Invalidator, PrincipalDirectory, StaticPrincipalDirectory};
pub use keys::{Identity, QueryKey, RequestKey, derive_query_key, derive_request_key};
pub use middleware::{CacheState, page_cache_layer};
pub use session::{CookieSessionGate, SessionGate};
pub use stats::{StatsSnapshot, StatsTracker};
pub use store::{CacheEntry, CachedPage, PageStore, RequestContext};
