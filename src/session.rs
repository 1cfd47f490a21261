//! Session markers and the bypass capability.
//!
//! The filesystem strategy relies on an external request router recognizing a
//! marker cookie to skip the cache for logged-in viewers and fresh
//! commenters. The host's auth hooks set and clear these cookies; the
//! interceptor consults a [`SessionGate`] instead of hardcoding cookie logic
//! so the core stays testable without a real client.

use axum::http::{HeaderMap, header};

use crate::keys::Identity;

/// Marker cookie the router checks to bypass cached files for logged-in
/// viewers.
pub const LOGGED_IN_COOKIE: &str = "staticcache_logged_in";
/// Marker cookie keeping a just-commented visitor on uncached pages while
/// moderation is pending.
pub const COMMENTER_COOKIE: &str = "staticcache_commenter";

const LOGGED_IN_MAX_AGE_SECS: u64 = 3_600;
const COMMENTER_MAX_AGE_SECS: u64 = 86_400;

/// `Set-Cookie` value for the host's successful-login hook.
pub fn mark_session_authenticated() -> String {
    format!("{LOGGED_IN_COOKIE}=1; Path=/; Max-Age={LOGGED_IN_MAX_AGE_SECS}")
}

/// `Set-Cookie` value for the host's logout hook.
pub fn clear_session_authenticated_marker() -> String {
    format!("{LOGGED_IN_COOKIE}=; Path=/; Max-Age=0")
}

/// `Set-Cookie` value for the host's comment-accepted hook, used when the
/// comment still awaits moderation.
pub fn mark_pending_commenter() -> String {
    format!("{COMMENTER_COOKIE}=1; Path=/; Max-Age={COMMENTER_MAX_AGE_SECS}")
}

/// Capability the interceptor uses to read session state from a request.
pub trait SessionGate: Send + Sync {
    /// The authenticated principal, or anonymous.
    fn identity(&self, headers: &HeaderMap) -> Identity;

    /// Whether the session carries the logged-in marker.
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        !self.identity(headers).is_anonymous()
    }

    /// Whether the session holds transient user-facing notices that must
    /// reach the principal once, uncached.
    fn has_pending_notices(&self, headers: &HeaderMap) -> bool;
}

/// Default gate: reads only the marker cookies defined in this module.
///
/// It cannot resolve a user id (that lives in the host's session store), so
/// `identity` is always anonymous; hosts that key cached pages per user
/// supply their own gate.
pub struct CookieSessionGate;

impl SessionGate for CookieSessionGate {
    fn identity(&self, _headers: &HeaderMap) -> Identity {
        Identity::Anonymous
    }

    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        // The commenter marker counts too: a pending commenter must keep
        // seeing fresh pages until moderation resolves.
        has_cookie(headers, LOGGED_IN_COOKIE) || has_cookie(headers, COMMENTER_COOKIE)
    }

    fn has_pending_notices(&self, _headers: &HeaderMap) -> bool {
        false
    }
}

/// Whether any `Cookie` header carries the named cookie.
pub fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .any(|pair| {
            pair.trim()
                .split_once('=')
                .is_some_and(|(cookie_name, _)| cookie_name == name)
        })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn login_marker_round_trip() {
        let set = mark_session_authenticated();
        assert!(set.starts_with("staticcache_logged_in=1"));
        assert!(set.contains("Max-Age=3600"));

        let clear = clear_session_authenticated_marker();
        assert!(clear.contains("Max-Age=0"));
    }

    #[test]
    fn cookie_gate_detects_logged_in_marker() {
        let gate = CookieSessionGate;
        let headers = headers_with_cookie("sid=abc; staticcache_logged_in=1");
        assert!(gate.is_authenticated(&headers));
        assert!(gate.identity(&headers).is_anonymous());
    }

    #[test]
    fn unrelated_cookies_do_not_authenticate() {
        let gate = CookieSessionGate;
        let headers = headers_with_cookie("sid=abc; theme=dark");
        assert!(!gate.is_authenticated(&headers));
        assert!(!gate.has_pending_notices(&headers));
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let headers = headers_with_cookie("staticcache_logged_in_extra=1");
        assert!(!has_cookie(&headers, LOGGED_IN_COOKIE));
    }

    #[test]
    fn commenter_marker_lasts_a_day() {
        assert!(mark_pending_commenter().contains("Max-Age=86400"));
    }

    #[test]
    fn commenter_marker_also_bypasses() {
        let gate = CookieSessionGate;
        let headers = headers_with_cookie("staticcache_commenter=1");
        assert!(gate.is_authenticated(&headers));
    }
}
