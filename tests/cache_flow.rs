//! End-to-end interceptor tests over an axum router.
//!
//! A counting handler stands in for the page renderer so each test can assert
//! exactly when the renderer ran and when a stored response was replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use staticcache::{CacheSettings, CacheState, Identity, SessionGate, page_cache_layer};

const PAGE_BODY: &str = "<html><body>rendered page</body></html>";

#[derive(Clone)]
struct RenderCounter(Arc<AtomicUsize>);

impl RenderCounter {
    fn new() -> Self {
        Self(Arc::new(AtomicUsize::new(0)))
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn app(settings: CacheSettings, counter: RenderCounter) -> (Router, CacheState) {
    let state = CacheState::from_settings(settings).expect("cache state should build");
    let router = Router::new()
        .route(
            "/{*path}",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.0.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "text/html")], PAGE_BODY).into_response()
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state.clone(), page_cache_layer));
    (router, state)
}

fn get_request(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::HOST, "example.com")
        .body(Body::empty())
        .expect("request should build")
}

fn x_cache(response: &Response) -> Option<String> {
    response
        .headers()
        .get("x-cache")
        .map(|v| v.to_str().unwrap().to_string())
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let counter = RenderCounter::new();
    let (app, _) = app(CacheSettings::default(), counter.clone());

    let first = app.clone().oneshot(get_request("/post/1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(x_cache(&first).as_deref(), Some("miss"));
    assert_eq!(body_string(first).await, PAGE_BODY);
    assert_eq!(counter.count(), 1);

    let second = app.clone().oneshot(get_request("/post/1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(x_cache(&second).as_deref(), Some("hit"));
    assert!(second.headers().contains_key("x-cache-elapsed"));
    assert_eq!(
        second.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html"
    );
    assert_eq!(body_string(second).await, PAGE_BODY);
    // The renderer did not run again.
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn compressed_entries_replay_the_original_body() {
    let counter = RenderCounter::new();
    let settings = CacheSettings {
        compress: true,
        ..Default::default()
    };
    let (app, _) = app(settings, counter.clone());

    app.clone().oneshot(get_request("/post/1")).await.unwrap();
    let hit = app.clone().oneshot(get_request("/post/1")).await.unwrap();

    assert_eq!(x_cache(&hit).as_deref(), Some("hit"));
    assert_eq!(body_string(hit).await, PAGE_BODY);
}

#[tokio::test]
async fn query_variants_are_cached_independently() {
    let counter = RenderCounter::new();
    let (app, _) = app(CacheSettings::default(), counter.clone());

    app.clone().oneshot(get_request("/post/1")).await.unwrap();
    let other_variant = app
        .clone()
        .oneshot(get_request("/post/1?page=2"))
        .await
        .unwrap();

    // Different query string, different variant: a fresh render.
    assert_eq!(x_cache(&other_variant).as_deref(), Some("miss"));
    assert_eq!(counter.count(), 2);

    let hit = app
        .clone()
        .oneshot(get_request("/post/1?page=2"))
        .await
        .unwrap();
    assert_eq!(x_cache(&hit).as_deref(), Some("hit"));
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn mutating_methods_bypass_the_cache() {
    let counter = RenderCounter::new();
    let (app, state) = app(CacheSettings::default(), counter.clone());

    for method in [Method::POST, Method::PUT] {
        let request = Request::builder()
            .method(method)
            .uri("/post/1")
            .header(header::HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        // Bypassed responses carry no cache marker at all.
        assert_eq!(x_cache(&response), None);
    }

    // Nothing was recorded as hit or miss.
    assert_eq!(state.stats.snapshot().total(), 0);
}

#[tokio::test]
async fn ignore_list_matches_are_never_cached() {
    let counter = RenderCounter::new();
    let (app, _) = app(CacheSettings::default(), counter.clone());

    for _ in 0..2 {
        let response = app.clone().oneshot(get_request("/admin/posts")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(x_cache(&response), None);
    }
    assert_eq!(counter.count(), 2);

    // The default list also matches on query substrings.
    let nocache = app
        .clone()
        .oneshot(get_request("/post/1?nocache"))
        .await
        .unwrap();
    assert_eq!(x_cache(&nocache), None);
}

#[tokio::test]
async fn not_found_responses_are_not_stored() {
    let counter = RenderCounter::new();
    let state = CacheState::from_settings(CacheSettings::default()).unwrap();
    let inner = counter.clone();
    let app = Router::new()
        .route(
            "/{*path}",
            get(move || {
                let counter = inner.clone();
                async move {
                    counter.0.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, page_cache_layer));

    let first = app.clone().oneshot(get_request("/missing")).await.unwrap();
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = app.clone().oneshot(get_request("/missing")).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert_eq!(x_cache(&second), None);
    // Both requests reached the renderer.
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn disabled_cache_passes_everything_through() {
    let counter = RenderCounter::new();
    let settings = CacheSettings {
        enabled: false,
        ..Default::default()
    };
    let (app, state) = app(settings, counter.clone());

    for _ in 0..2 {
        let response = app.clone().oneshot(get_request("/post/1")).await.unwrap();
        assert_eq!(x_cache(&response), None);
    }
    assert_eq!(counter.count(), 2);
    assert_eq!(state.stats.snapshot().total(), 0);
}

struct NoticeGate;

impl SessionGate for NoticeGate {
    fn identity(&self, _headers: &axum::http::HeaderMap) -> Identity {
        Identity::Anonymous
    }

    fn has_pending_notices(&self, headers: &axum::http::HeaderMap) -> bool {
        headers.contains_key("x-test-notice")
    }
}

#[tokio::test]
async fn pending_notices_force_a_fresh_render() {
    let counter = RenderCounter::new();
    let state = CacheState::from_settings(CacheSettings::default())
        .unwrap()
        .with_session_gate(Arc::new(NoticeGate));
    let inner = counter.clone();
    let app = Router::new()
        .route(
            "/{*path}",
            get(move || {
                let counter = inner.clone();
                async move {
                    counter.0.fetch_add(1, Ordering::SeqCst);
                    PAGE_BODY
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, page_cache_layer));

    // Seed the cache without a notice.
    app.clone().oneshot(get_request("/post/1")).await.unwrap();
    assert_eq!(counter.count(), 1);

    // A session with a pending notice must reach the renderer even though a
    // cached copy exists.
    let request = Request::builder()
        .method(Method::GET)
        .uri("/post/1")
        .header(header::HOST, "example.com")
        .header("x-test-notice", "1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(x_cache(&response), None);
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn logged_in_sessions_never_touch_the_anonymous_cache() {
    let counter = RenderCounter::new();
    let (app, _) = app(CacheSettings::default(), counter.clone());

    // Seed the anonymous entry.
    app.clone().oneshot(get_request("/post/1")).await.unwrap();
    assert_eq!(counter.count(), 1);

    // The default gate cannot resolve a user id, so a logged-in session is
    // rendered fresh instead of being served another viewer's page.
    let logged_in = Request::builder()
        .method(Method::GET)
        .uri("/post/1")
        .header(header::HOST, "example.com")
        .header(header::COOKIE, "staticcache_logged_in=1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(logged_in).await.unwrap();
    assert_eq!(x_cache(&response), None);
    assert_eq!(counter.count(), 2);

    // And the anonymous entry is untouched.
    let hit = app.clone().oneshot(get_request("/post/1")).await.unwrap();
    assert_eq!(x_cache(&hit).as_deref(), Some("hit"));
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn hits_and_misses_feed_the_stats_tracker() {
    let counter = RenderCounter::new();
    let (app, state) = app(CacheSettings::default(), counter.clone());

    app.clone().oneshot(get_request("/a")).await.unwrap();
    app.clone().oneshot(get_request("/a")).await.unwrap();
    app.clone().oneshot(get_request("/b")).await.unwrap();

    let snapshot = state.stats.snapshot();
    assert_eq!(snapshot.hits, 1);
    assert_eq!(snapshot.misses, 2);
    assert!(snapshot.avg_seconds >= 0.0);
}
