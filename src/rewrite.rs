//! Router rule rendering for the filesystem strategy.
//!
//! With the filesystem strategy, hits never reach the application: an
//! external request router (Apache `mod_rewrite` syntax here, trivially
//! transliterated for other routers) maps eligible request paths straight to
//! the files the store writes. These functions render the two rule blocks the
//! operator installs: one at the site root directing requests into the cache
//! tree, and one inside the cache tree teaching the router to serve `.gz`
//! siblings with the right encoding headers.
//!
//! Feed pages (`index.xml`) are deliberately absent from the rules; feeds
//! carry content-type subtleties best left to the application, so they fall
//! through and are served as ordinary misses.

use crate::config::CacheSettings;
use crate::error::CacheError;
use crate::session::{COMMENTER_COOKIE, LOGGED_IN_COOKIE};

const SERVE_RULES_BEGIN: &str = "### STATICCACHE START";
const SERVE_RULES_END: &str = "### STATICCACHE END";
const CACHE_DIR_RULES_BEGIN: &str = "# BEGIN STATICCACHE";
const CACHE_DIR_RULES_END: &str = "# END STATICCACHE";

/// Render the site-root rule block.
///
/// A request is served from the cache tree only when every condition holds:
/// non-POST, no key=value query string, no session marker cookie, and the
/// target file exists. The gzip variant is preferred when the client accepts
/// it. Everything else falls through to the application.
pub fn serve_rules(settings: &CacheSettings) -> Result<String, CacheError> {
    let root = settings.cache_root.display();
    let cookie_cond = format!(
        "RewriteCond %{{HTTP:Cookie}} !^.*({LOGGED_IN_COOKIE}|{COMMENTER_COOKIE}).*$"
    );
    // Also validates site_url early so a misconfigured host fails at render
    // time, not in the router.
    settings.site_host()?;
    // Sites installed under a subpath rewrite relative to that subpath.
    let site = settings.parsed_site_url()?;
    let base = site.path().trim_end_matches('/');
    let rewrite_base = if base.is_empty() {
        "/".to_string()
    } else {
        base.to_string()
    };

    let lines = [
        SERVE_RULES_BEGIN.to_string(),
        "RewriteEngine On".to_string(),
        format!("RewriteBase {rewrite_base}"),
        "RewriteCond %{REQUEST_METHOD} !POST".to_string(),
        "RewriteCond %{QUERY_STRING} !.*=.*".to_string(),
        cookie_cond.clone(),
        "RewriteCond %{HTTP:Accept-Encoding} gzip".to_string(),
        format!("RewriteCond {root}/%{{SERVER_NAME}}/$1/index.html.gz -f"),
        format!("RewriteRule ^(.*) \"{root}/%{{SERVER_NAME}}/$1/index.html.gz\" [L]"),
        String::new(),
        "RewriteCond %{REQUEST_METHOD} !POST".to_string(),
        "RewriteCond %{QUERY_STRING} !.*=.*".to_string(),
        cookie_cond,
        format!("RewriteCond {root}/%{{SERVER_NAME}}/$1/index.html -f"),
        format!("RewriteRule ^(.*) \"{root}/%{{SERVER_NAME}}/$1/index.html\" [L]"),
        SERVE_RULES_END.to_string(),
    ];
    Ok(lines.join("\n"))
}

/// Render the rule block installed inside the cache root.
///
/// Teaches the router to serve `.html.gz` files as gzip-encoded HTML without
/// re-compressing them, and stamps cache-control headers matching the
/// configured page TTL.
pub fn cache_dir_rules(settings: &CacheSettings) -> String {
    let ttl = settings.ttl_seconds;
    let lines = [
        CACHE_DIR_RULES_BEGIN.to_string(),
        "<IfModule mod_mime.c>".to_string(),
        "  <FilesMatch \"\\.html\\.gz$\">".to_string(),
        "    ForceType text/html".to_string(),
        "    FileETag None".to_string(),
        "  </FilesMatch>".to_string(),
        "  AddEncoding gzip .gz".to_string(),
        "  AddType text/html .gz".to_string(),
        "</IfModule>".to_string(),
        "<IfModule mod_deflate.c>".to_string(),
        "  SetEnvIfNoCase Request_URI \\.gz$ no-gzip".to_string(),
        "</IfModule>".to_string(),
        "<IfModule mod_headers.c>".to_string(),
        "  Header set Vary \"Accept-Encoding, Cookie\"".to_string(),
        format!("  Header set Cache-Control \"max-age={ttl}, must-revalidate\""),
        "</IfModule>".to_string(),
        "<IfModule mod_expires.c>".to_string(),
        "  ExpiresActive On".to_string(),
        format!("  ExpiresByType text/html \"modification plus {ttl} seconds\""),
        "</IfModule>".to_string(),
        CACHE_DIR_RULES_END.to_string(),
    ];
    lines.join("\n")
}

/// Merge a rendered rule block into an existing router config file body.
///
/// The block is prepended so cache rules win before any application rules.
/// Idempotent: a file already containing the block is returned unchanged.
pub fn merge_rules(current: &str, block: &str) -> String {
    if current.contains(block) {
        return current.to_string();
    }
    format!("{block}\n{current}")
}
