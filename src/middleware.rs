//! Request interceptor.
//!
//! Runs at two points in the request lifecycle: pre-dispatch (serve a stored
//! response when one is valid) and post-render (capture the final output on a
//! miss). Every failure path degrades to "as if no cache existed"; nothing
//! here may alter the viewer-facing body.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use metrics::{counter, histogram};
use tracing::{debug, instrument, warn};

use crate::config::{CacheSettings, CacheStrategy};
use crate::error::CacheError;
use crate::session::{CookieSessionGate, SessionGate};
use crate::stats::StatsTracker;
use crate::store::{self, PageStore, RequestContext};

const X_CACHE: &str = "x-cache";
const X_CACHE_ELAPSED: &str = "x-cache-elapsed";

/// Shared cache state for the interceptor.
#[derive(Clone)]
pub struct CacheState {
    pub settings: Arc<CacheSettings>,
    pub store: Arc<dyn PageStore>,
    pub stats: Arc<StatsTracker>,
    pub session: Arc<dyn SessionGate>,
}

impl CacheState {
    /// Build the state for the configured strategy with the default
    /// cookie-based session gate.
    pub fn from_settings(settings: CacheSettings) -> Result<Self, CacheError> {
        let store = store::from_settings(&settings)?;
        let stats = Arc::new(StatsTracker::new(&settings));
        Ok(Self {
            settings: Arc::new(settings),
            store,
            stats,
            session: Arc::new(CookieSessionGate),
        })
    }

    /// Replace the session gate, e.g. with one backed by the host's session
    /// store.
    pub fn with_session_gate(mut self, gate: Arc<dyn SessionGate>) -> Self {
        self.session = gate;
        self
    }

    fn fallback_host(&self) -> String {
        self.settings
            .site_host()
            .unwrap_or_else(|_| "localhost".to_string())
    }
}

/// Middleware for full-page response caching.
///
/// Mutating verbs, ignore-list matches, and sessions with pending notices
/// bypass the cache entirely; hits replay the stored header set and body and
/// terminate the request; misses register a post-render capture.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();

    if !cache.settings.enabled {
        return next.run(request).await;
    }

    // Mutating verbs are never cached and never served from cache.
    if request.method() == Method::POST || request.method() == Method::PUT {
        debug!(outcome = "bypass", reason = "mutating_method");
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| cache.fallback_host());

    let request_line = format!("{host}{}", request.uri());
    if cache.settings.matches_ignore_list(&request_line) {
        debug!(outcome = "bypass", reason = "ignore_list");
        return next.run(request).await;
    }

    // Transient notices must reach the principal once, uncached; never
    // freeze them into a stored response.
    if cache.session.has_pending_notices(request.headers()) {
        debug!(outcome = "bypass", reason = "pending_notices");
        return next.run(request).await;
    }

    let identity = cache.session.identity(request.headers());
    let authenticated =
        !identity.is_anonymous() || cache.session.is_authenticated(request.headers());

    // An authenticated session whose gate cannot resolve a user id must not
    // read or pollute the anonymous entries. The filesystem strategy handles
    // this case itself (capture is skipped, response marked uncached).
    if authenticated
        && identity.is_anonymous()
        && cache.settings.strategy == CacheStrategy::Indexed
    {
        debug!(outcome = "bypass", reason = "unresolved_identity");
        return next.run(request).await;
    }

    let ctx = RequestContext {
        identity,
        host,
        path: request.uri().path().to_string(),
        query: request.uri().query().unwrap_or("").to_string(),
        authenticated,
    };

    if let Some(page) = cache.store.lookup(&ctx).await {
        match page.decompressed_body() {
            Ok(body) => {
                let elapsed = started.elapsed().as_secs_f64();
                cache.stats.record_hit(elapsed);
                counter!("staticcache_hit_total").increment(1);
                histogram!("staticcache_hit_elapsed_seconds").record(elapsed);
                debug!(outcome = "hit", elapsed_seconds = elapsed, "serving cached response");
                return serve_cached(&page.headers, body, elapsed);
            }
            Err(err) => {
                // Corrupt entry; fall through to the renderer as a miss.
                warn!(error = %err, "cached body unreadable, treating as miss");
            }
        }
    }

    cache.stats.record_miss();
    counter!("staticcache_miss_total").increment(1);
    debug!(outcome = "miss", "executing renderer");

    let response = next.run(request).await;

    // A "page not found" outcome is never stored.
    if response.status() == StatusCode::NOT_FOUND {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(error = %err, "failed to buffer rendered body, returning uncached");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    let marked_uncached =
        ctx.authenticated && cache.settings.strategy == CacheStrategy::Filesystem;

    match cache.store.capture(&ctx, &headers, &bytes).await {
        Ok(()) => {
            counter!("staticcache_store_total").increment(1);
        }
        Err(err) => {
            // Capture happens post-render; the viewer's page is unaffected.
            warn!(error = %err, "failed to store captured response");
            counter!("staticcache_store_error_total").increment(1);
        }
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    let marker = if marked_uncached { "uncached" } else { "miss" };
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(marker));
    response
}

/// Build a response from a stored entry: exact captured header set, plus
/// cache diagnostics.
fn serve_cached(headers: &[(String, String)], body: Bytes, elapsed: f64) -> Response {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name, value);
        }
    }
    builder = builder
        .header(X_CACHE, "hit")
        .header(X_CACHE_ELAPSED, format!("{elapsed:.6}"));

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
