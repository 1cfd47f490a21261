//! Configuration layer: typed settings with layered precedence (file → env).

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use config::{Config, Environment, File};
use serde::Deserialize;
use time::Duration;
use url::Url;

use crate::error::CacheError;
use crate::events::SiteUrls;

const DEFAULT_CONFIG_BASENAME: &str = "staticcache";
const ENV_PREFIX: &str = "STATICCACHE";

const DEFAULT_TTL_SECONDS: u64 = 86_400;
const DEFAULT_STATS_TTL_SECONDS: u64 = 604_800;
const DEFAULT_GZIP_LEVEL: u32 = 4;
const DEFAULT_MAX_ENTRIES: usize = 4096;
const DEFAULT_CACHE_ROOT: &str = "cache/staticcache";
const DEFAULT_SITE_URL: &str = "http://localhost";
const DEFAULT_FEED_PATH: &str = "/atom/1";
const DEFAULT_IGNORE_LIST: &[&str] = &[
    "/admin",
    "/feedback",
    "/user",
    "/ajax",
    "/auth_ajax",
    "?nocache",
    "/auth",
    "/cron",
];

/// Which storage strategy serves and captures pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Keyed in-process store with native per-entry expiry; hits are served
    /// by the interceptor.
    Indexed,
    /// On-disk files served directly by an external request router via
    /// rewrite rules; the application only writes.
    Filesystem,
}

/// How often the host scheduler should run filesystem garbage collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcInterval {
    Never,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl GcInterval {
    /// Sweep cadence for the host scheduler; `None` disables collection.
    pub fn as_duration(self) -> Option<StdDuration> {
        match self {
            GcInterval::Never => None,
            GcInterval::Hourly => Some(StdDuration::from_secs(3_600)),
            GcInterval::Daily => Some(StdDuration::from_secs(86_400)),
            GcInterval::Weekly => Some(StdDuration::from_secs(604_800)),
            GcInterval::Monthly => Some(StdDuration::from_secs(2_592_000)),
        }
    }
}

/// Cache configuration from `staticcache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Master switch; when off the interceptor passes everything through.
    pub enabled: bool,
    /// Active storage strategy.
    pub strategy: CacheStrategy,
    /// Page time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Stats time-to-live in seconds; long so stats survive cache churn.
    pub stats_ttl_seconds: u64,
    /// Compress stored bodies (gzip).
    pub compress: bool,
    /// Gzip level used when `compress` is on.
    pub gzip_level: u32,
    /// Requests whose `host + uri` contains any of these substrings
    /// (case-insensitive) are never cached.
    pub ignore_list: Vec<String>,
    /// Capacity bound for the indexed store; a full store degrades to misses.
    pub max_entries: usize,
    /// Root directory for the filesystem strategy.
    pub cache_root: PathBuf,
    /// Public site URL; determines the hostname scope and the site root.
    pub site_url: String,
    /// Path of the site's aggregate feed, relative to `site_url`.
    pub feed_path: String,
    /// Garbage collection cadence for the host scheduler.
    pub gc_interval: GcInterval,
    pub logging: LoggingSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CacheStrategy::Indexed,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            stats_ttl_seconds: DEFAULT_STATS_TTL_SECONDS,
            compress: false,
            gzip_level: DEFAULT_GZIP_LEVEL,
            ignore_list: DEFAULT_IGNORE_LIST.iter().map(|s| s.to_string()).collect(),
            max_entries: DEFAULT_MAX_ENTRIES,
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            site_url: DEFAULT_SITE_URL.to_string(),
            feed_path: DEFAULT_FEED_PATH.to_string(),
            gc_interval: GcInterval::Daily,
            logging: LoggingSettings::default(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::seconds(self.stats_ttl_seconds as i64)
    }

    /// Page expiry threshold used by the garbage collector.
    pub fn gc_cutoff(&self) -> StdDuration {
        StdDuration::from_secs(self.ttl_seconds)
    }

    /// Case-insensitive substring match against the ignore list.
    pub fn matches_ignore_list(&self, request_line: &str) -> bool {
        let request_line = request_line.to_ascii_lowercase();
        self.ignore_list
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .any(|entry| request_line.contains(&entry.trim().to_ascii_lowercase()))
    }

    /// Parse the configured site URL.
    pub fn parsed_site_url(&self) -> Result<Url, CacheError> {
        Url::parse(&self.site_url).map_err(|err| {
            CacheError::invalid_configuration(format!(
                "site_url `{}` is not a valid URL: {err}",
                self.site_url
            ))
        })
    }

    /// Hostname scoping the cache (and the filesystem cache tree).
    pub fn site_host(&self) -> Result<String, CacheError> {
        let url = self.parsed_site_url()?;
        url.host_str().map(str::to_string).ok_or_else(|| {
            CacheError::invalid_configuration(format!("site_url `{}` has no host", self.site_url))
        })
    }

    /// Site root and aggregate feed URLs used by event-driven invalidation.
    pub fn site_urls(&self) -> Result<SiteUrls, CacheError> {
        let site_root = self.parsed_site_url()?;
        let aggregate_feed = site_root.join(&self.feed_path).map_err(|err| {
            CacheError::invalid_configuration(format!(
                "feed_path `{}` does not resolve against site_url: {err}",
                self.feed_path
            ))
        })?;
        Ok(SiteUrls {
            site_root,
            aggregate_feed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Base tracing directive, e.g. `info` or `staticcache=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Load settings from an optional file plus `STATICCACHE__*` environment
/// variables, environment taking precedence.
pub fn load(config_file: Option<&Path>) -> Result<CacheSettings, CacheError> {
    let mut builder = Config::builder();
    builder = match config_file {
        Some(path) => builder.add_source(File::from(path)),
        None => builder.add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false)),
    };
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|err| CacheError::invalid_configuration(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let settings = CacheSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.strategy, CacheStrategy::Indexed);
        assert_eq!(settings.ttl_seconds, 86_400);
        assert_eq!(settings.stats_ttl_seconds, 604_800);
        assert!(!settings.compress);
        assert_eq!(settings.gzip_level, 4);
        assert_eq!(settings.max_entries, 4096);
        assert_eq!(settings.gc_interval, GcInterval::Daily);
        assert!(settings.ignore_list.iter().any(|e| e == "/admin"));
    }

    #[test]
    fn ignore_list_matches_case_insensitively() {
        let settings = CacheSettings::default();
        assert!(settings.matches_ignore_list("example.com/ADMIN/posts"));
        assert!(settings.matches_ignore_list("example.com/page?nocache=1"));
        assert!(!settings.matches_ignore_list("example.com/post/1"));
    }

    #[test]
    fn empty_ignore_entries_never_match() {
        let settings = CacheSettings {
            ignore_list: vec![String::new(), "  ".to_string()],
            ..Default::default()
        };
        assert!(!settings.matches_ignore_list("example.com/anything"));
    }

    #[test]
    fn gc_interval_durations() {
        assert_eq!(GcInterval::Never.as_duration(), None);
        assert_eq!(
            GcInterval::Hourly.as_duration(),
            Some(StdDuration::from_secs(3_600))
        );
        assert_eq!(
            GcInterval::Monthly.as_duration(),
            Some(StdDuration::from_secs(2_592_000))
        );
    }

    #[test]
    fn site_urls_resolve_from_settings() {
        let settings = CacheSettings {
            site_url: "http://example.com".to_string(),
            feed_path: "/atom/1".to_string(),
            ..Default::default()
        };
        let site = settings.site_urls().expect("site urls");
        assert_eq!(site.site_root.as_str(), "http://example.com/");
        assert_eq!(site.aggregate_feed.as_str(), "http://example.com/atom/1");
        assert_eq!(settings.site_host().expect("host"), "example.com");
    }

    #[test]
    fn invalid_site_url_is_a_configuration_error() {
        let settings = CacheSettings {
            site_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.site_urls(),
            Err(CacheError::InvalidConfiguration { .. })
        ));
    }
}
