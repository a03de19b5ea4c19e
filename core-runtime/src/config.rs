//! # Core Configuration Module
//!
//! Provides configuration management for the VibeStream core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the remote store settings, consistency tuning knobs and
//! default query limits. Validation is fail-fast: `build()` rejects values that
//! would make the consistency layer misbehave (a zero reconcile page size would
//! never finish counting, for instance).
//!
//! ## Usage
//!
//! ### Remote store with defaults
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .store_url("https://records.example.com/api")
//!     .api_key("secret")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.limits.top_charts, 10);
//! ```
//!
//! ### Tuning consistency
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .reconcile_page_size(200)
//!     .reconcile_follower_counts(false)
//!     .build()
//!     .expect("valid config");
//!
//! assert!(!config.consistency.reconcile_follower_counts);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Page size must be positive
//! let config = CoreConfig::builder()
//!     .reconcile_page_size(0)
//!     .build()
//!     .expect("Should fail - invalid page size");
//! ```

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LoggingConfig};
use bridge_traits::http::{HttpClient, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Default page size used when counting join rows during reconciliation.
pub const DEFAULT_RECONCILE_PAGE_SIZE: u32 = 500;

/// Upper bound for the reconcile page size.
const MAX_RECONCILE_PAGE_SIZE: u32 = 10_000;

/// Core configuration for the VibeStream core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Remote record store connection settings
    pub store: StoreConfig,

    /// HTTP client used by the remote store connector (desktop default: reqwest)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Consistency layer tuning
    pub consistency: ConsistencyConfig,

    /// Default limits for ranked/listing queries
    pub limits: QueryLimits,

    /// Logging setup applied by the service bootstrap
    pub logging: LoggingConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("store", &self.store)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("consistency", &self.consistency)
            .field("limits", &self.limits)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Connection settings for the remote record store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL of the store API, e.g. `https://records.example.com/api`
    pub base_url: Option<String>,
    /// Bearer credential sent with every request
    pub api_key: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retry policy for read requests. Mutations are never retried by the
    /// connector because record creation is not idempotent.
    pub read_retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            request_timeout: Duration::from_secs(30),
            read_retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self
                    .api_key
                    .as_deref()
                    .map(|key| redact_if_sensitive("api_key", key)),
            )
            .field("request_timeout", &self.request_timeout)
            .field("read_retry", &self.read_retry)
            .finish()
    }
}

/// Consistency layer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyConfig {
    /// Page size used when counting join rows for an aggregate
    pub reconcile_page_size: u32,
    /// Recompute `Artist.follower_count` after every follow toggle
    pub reconcile_follower_counts: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            reconcile_page_size: DEFAULT_RECONCILE_PAGE_SIZE,
            reconcile_follower_counts: true,
        }
    }
}

/// Default limits for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub top_charts: u32,
    pub featured_artists: u32,
    pub trending_playlists: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            top_charts: 10,
            featured_artists: 6,
            trending_playlists: 8,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Store URL, when present, is an http(s) URL
    /// - Request timeout is non-zero
    /// - Read retry policy makes at least one attempt
    /// - Reconcile page size is within `1..=10_000`
    /// - Query limits are non-zero
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.store.base_url {
            if url.trim().is_empty() {
                return Err(Error::Config("Store URL cannot be empty".to_string()));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "Store URL must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }

        if self.store.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.store.read_retry.max_attempts == 0 {
            return Err(Error::Config(
                "Read retry policy must allow at least one attempt".to_string(),
            ));
        }

        let page_size = self.consistency.reconcile_page_size;
        if page_size == 0 || page_size > MAX_RECONCILE_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Reconcile page size must be between 1 and {}, got {}",
                MAX_RECONCILE_PAGE_SIZE, page_size
            )));
        }

        if self.limits.top_charts == 0
            || self.limits.featured_artists == 0
            || self.limits.trending_playlists == 0
        {
            return Err(Error::Config(
                "Query limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Store base URL, or an actionable error when the remote store was not configured.
    pub fn require_store_url(&self) -> Result<&str> {
        self.store
            .base_url
            .as_deref()
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "StoreGateway".to_string(),
                message: "No store URL configured. Set `store_url` on the builder, \
                          or construct the service with an explicit StoreGateway."
                    .to_string(),
            })
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    store: StoreConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    consistency: ConsistencyConfig,
    limits: QueryLimits,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the remote store base URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .store_url("https://records.example.com/api");
    /// ```
    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.store.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Sets the bearer credential for the store.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.store.api_key = Some(key.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.store.request_timeout = timeout;
        self
    }

    /// Sets the retry policy for read requests.
    pub fn read_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.store.read_retry = policy;
        self
    }

    /// Injects a custom HTTP client.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the page size used while counting join rows.
    pub fn reconcile_page_size(mut self, page_size: u32) -> Self {
        self.consistency.reconcile_page_size = page_size;
        self
    }

    /// Enables or disables follower count reconciliation after follow toggles.
    pub fn reconcile_follower_counts(mut self, enabled: bool) -> Self {
        self.consistency.reconcile_follower_counts = enabled;
        self
    }

    /// Sets the default number of top chart entries.
    pub fn top_charts_limit(mut self, limit: u32) -> Self {
        self.limits.top_charts = limit;
        self
    }

    /// Sets the default number of featured artists.
    pub fn featured_artists_limit(mut self, limit: u32) -> Self {
        self.limits.featured_artists = limit;
        self
    }

    /// Sets the default number of trending playlists.
    pub fn trending_playlists_limit(mut self, limit: u32) -> Self {
        self.limits.trending_playlists = limit;
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the final [`CoreConfig`], validating every setting.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            store: self.store,
            http_client: self.http_client,
            consistency: self.consistency,
            limits: self.limits,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = CoreConfig::builder().build().unwrap();

        assert_eq!(config.store.base_url, None);
        assert_eq!(
            config.consistency.reconcile_page_size,
            DEFAULT_RECONCILE_PAGE_SIZE
        );
        assert!(config.consistency.reconcile_follower_counts);
        assert_eq!(config.limits, QueryLimits::default());
    }

    #[test]
    fn test_store_url_trailing_slash_trimmed() {
        let config = CoreConfig::builder()
            .store_url("https://records.example.com/api/")
            .build()
            .unwrap();

        assert_eq!(
            config.require_store_url().unwrap(),
            "https://records.example.com/api"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = CoreConfig::builder().store_url("ftp://example.com").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let result = CoreConfig::builder().top_charts_limit(0).build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = CoreConfig::builder().reconcile_page_size(20_000).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_store_url_is_capability_error() {
        let config = CoreConfig::builder().build().unwrap();
        let err = config.require_store_url().unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { .. }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = CoreConfig::builder()
            .store_url("https://records.example.com")
            .api_key("super-secret")
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
