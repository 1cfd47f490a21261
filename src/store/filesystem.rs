//! Filesystem storage strategy.
//!
//! Rendered pages are written as plain files under
//! `<cache_root>/<hostname>/<url-path>/index.html` (`index.xml` for
//! feed-class URLs), with an optional `.gz` sibling. An external request
//! router serves hits directly via rewrite rules; the application only
//! writes, purges, and sweeps.
//!
//! Authenticated principals are never written here: the router decides
//! cache-bypass from a session cookie, and the application must not race
//! against that decision by caching logged-in output.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::compress;
use crate::config::CacheSettings;
use crate::error::CacheError;
use crate::keys::Identity;

use super::{CachedPage, PageStore, RequestContext};

const INDEX_HTML: &str = "index.html";
const INDEX_XML: &str = "index.xml";
const INDEX_FILES: &[&str] = &["index.html", "index.html.gz", "index.xml", "index.xml.gz"];

/// Filesystem page store scoped to one site hostname.
pub struct FilesystemStore {
    host_root: PathBuf,
    /// Normalized path of the site root URL; its directory anchors the cache
    /// tree and is never removed by `purge`.
    site_root_path: String,
    compress: bool,
    gzip_level: u32,
}

impl FilesystemStore {
    pub fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
        if settings.cache_root.as_os_str().is_empty() {
            return Err(CacheError::invalid_configuration(
                "filesystem strategy requires a cache_root",
            ));
        }
        let host = settings.site_host()?;
        let site_root_path = settings
            .parsed_site_url()?
            .path()
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            host_root: settings.cache_root.join(host),
            site_root_path,
            compress: settings.compress,
            gzip_level: settings.gzip_level,
        })
    }

    /// Root of this site's cache tree (`<cache_root>/<hostname>`).
    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Directory a URL path is served from. Computed, not stored.
    pub fn serve_path_for(&self, url_path: &str) -> PathBuf {
        let trimmed = url_path.trim_matches('/');
        if trimmed.is_empty() {
            self.host_root.clone()
        } else {
            self.host_root.join(trimmed)
        }
    }

    /// Feed-class URLs get `index.xml` so the router serves the right type.
    pub fn index_file_name(url_path: &str) -> &'static str {
        let is_feed = url_path
            .split('/')
            .any(|segment| matches!(segment, "atom" | "feed" | "rss"));
        if is_feed { INDEX_XML } else { INDEX_HTML }
    }

    /// Remove the index files for a URL path, and the directory itself unless
    /// it is the site root (the cache-root anchor must persist).
    pub async fn purge(&self, url_path: &str) -> Result<(), CacheError> {
        let dir = self.serve_path_for(url_path);
        for name in INDEX_FILES {
            match fs::remove_file(dir.join(name)).await {
                Ok(()) => {}
                // Vanished between enumeration and delete, or never cached.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(CacheError::write_failure(format!(
                        "failed to purge {}: {err}",
                        dir.join(name).display()
                    )));
                }
            }
        }
        if url_path.trim_end_matches('/') != self.site_root_path {
            // Best effort: the directory may hold cached children.
            let _ = fs::remove_dir(&dir).await;
        }
        Ok(())
    }

    async fn write_page(&self, url_path: &str, body: &[u8]) -> Result<(), CacheError> {
        let dir = self.serve_path_for(url_path);
        fs::create_dir_all(&dir).await.map_err(|err| {
            CacheError::write_failure(format!(
                "failed to create cache directory {}: {err}",
                dir.display()
            ))
        })?;

        let file_name = Self::index_file_name(url_path);
        let mut content = body.to_vec();
        content.extend_from_slice(generation_footer().as_bytes());

        write_atomic(dir.clone(), file_name.to_string(), content.clone()).await?;

        if self.compress {
            content.extend_from_slice(b"\n<!-- compression: gzip -->");
            let packed = compress::gzip(&content, self.gzip_level)
                .map_err(|err| CacheError::write_failure(format!("gzip failed: {err}")))?;
            write_atomic(dir.clone(), format!("{file_name}.gz"), packed).await?;
        }

        debug!(
            target = "staticcache::store::filesystem",
            path = %dir.display(),
            file = file_name,
            "wrote cached page"
        );
        Ok(())
    }
}

#[async_trait]
impl PageStore for FilesystemStore {
    /// Always a miss: hits are served by the external router, not the app.
    async fn lookup(&self, _ctx: &RequestContext) -> Option<CachedPage> {
        None
    }

    async fn capture(
        &self,
        ctx: &RequestContext,
        _headers: &[(String, String)],
        body: &[u8],
    ) -> Result<(), CacheError> {
        if ctx.authenticated {
            // The interceptor marks the response uncached; nothing to do.
            return Ok(());
        }
        self.write_page(&ctx.path, body).await
    }

    async fn expire_urls(&self, urls: &[Url], _principals: &[Identity]) -> Result<(), CacheError> {
        // One shared file per URL path; no per-identity fan-out.
        for url in urls {
            self.purge(url.path()).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.host_root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::write_failure(format!(
                "failed to clear cache tree {}: {err}",
                self.host_root.display()
            ))),
        }
    }
}

/// Write-then-rename so a concurrently routed reader never observes a
/// truncated file.
async fn write_atomic(dir: PathBuf, file_name: String, bytes: Vec<u8>) -> Result<(), CacheError> {
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(dir.join(&file_name)).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(|err| CacheError::write_failure(format!("atomic write task failed: {err}")))?;

    result.map_err(|err| CacheError::write_failure(format!("atomic write failed: {err}")))
}

fn generation_footer() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let stamp = OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "unknown".to_string());
    format!("\n<!-- cached page generated on {stamp} -->")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(root: &Path) -> CacheSettings {
        CacheSettings {
            cache_root: root.to_path_buf(),
            site_url: "http://example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn feed_paths_use_xml_index() {
        assert_eq!(FilesystemStore::index_file_name("/atom/1"), "index.xml");
        assert_eq!(FilesystemStore::index_file_name("/feed"), "index.xml");
        assert_eq!(FilesystemStore::index_file_name("/post/1"), "index.html");
    }

    #[test]
    fn serve_path_mirrors_url_path_under_host_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(&settings_in(tmp.path())).unwrap();
        assert_eq!(
            store.serve_path_for("/post/1"),
            tmp.path().join("example.com").join("post/1")
        );
        assert_eq!(store.serve_path_for("/"), tmp.path().join("example.com"));
    }

    #[test]
    fn empty_cache_root_is_a_configuration_error() {
        let settings = CacheSettings {
            cache_root: PathBuf::new(),
            ..Default::default()
        };
        assert!(matches!(
            FilesystemStore::new(&settings),
            Err(CacheError::InvalidConfiguration { .. })
        ));
    }
}
