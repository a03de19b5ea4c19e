//! Core service façade and bootstrap helpers.
//!
//! This crate wires a record store gateway and the runtime configuration into
//! the consistency core. Every catalog service built here shares one gateway
//! and one lock table, so a follow toggled through [`CoreService::artists`] and
//! a membership change made through [`CoreService::playlists`] serialize on
//! the same keys.
//!
//! Desktop apps typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`]. Tests and embedders with
//! their own store hand any `StoreGateway` to [`CoreService::new`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::store::StoreGateway;
use core_library::services::{ArtistService, GenreService, PlaylistService, SongService};
use core_library::KeyedLocks;
use core_runtime::config::CoreConfig;
use provider_remote_store::RemoteStoreConnector;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    gateway: Arc<dyn StoreGateway>,
    config: Arc<CoreConfig>,
    locks: KeyedLocks,
    songs: SongService,
    artists: ArtistService,
    playlists: PlaylistService,
    genres: GenreService,
}

impl CoreService {
    /// Create the service over an explicit gateway.
    pub fn new(gateway: Arc<dyn StoreGateway>, config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let locks = KeyedLocks::new();
        let songs = SongService::new(Arc::clone(&gateway), locks.clone(), config.limits);
        let artists = ArtistService::new(
            Arc::clone(&gateway),
            locks.clone(),
            config.consistency,
            config.limits,
        );
        let playlists = PlaylistService::new(
            Arc::clone(&gateway),
            locks.clone(),
            config.consistency,
            config.limits,
        );
        let genres = GenreService::new(Arc::clone(&gateway));

        Ok(Self {
            gateway,
            config: Arc::new(config),
            locks,
            songs,
            artists,
            playlists,
            genres,
        })
    }

    /// Create the service over the remote store described by `config`.
    ///
    /// Requires `store.base_url` and an HTTP client in the config.
    pub fn from_config(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.require_store_url()?.to_string();
        let http_client = config
            .http_client
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "No HTTP client configured. Set `http_client` on the config builder, \
                          or enable the `desktop-shims` feature and use `bootstrap_desktop`."
                    .to_string(),
            })?;

        let mut connector = RemoteStoreConnector::new(http_client, base_url.as_str())
            .with_timeout(config.store.request_timeout)
            .with_read_retry(config.store.read_retry.clone());
        if let Some(api_key) = &config.store.api_key {
            connector = connector.with_api_key(api_key.as_str());
        }

        info!(store = %base_url, "Connecting to remote record store");
        Self::new(Arc::new(connector), config)
    }

    pub fn songs(&self) -> &SongService {
        &self.songs
    }

    pub fn artists(&self) -> &ArtistService {
        &self.artists
    }

    pub fn playlists(&self) -> &PlaylistService {
        &self.playlists
    }

    pub fn genres(&self) -> &GenreService {
        &self.genres
    }

    /// The gateway every service reads and writes through.
    pub fn gateway(&self) -> Arc<dyn StoreGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The lock table shared by all services.
    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Installs the configured logging (a subscriber that is already installed is
/// left in place), falls back to a reqwest client when the config carries no
/// HTTP client, and connects to the remote store.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # fn example() -> core_service::Result<()> {
/// use core_runtime::config::CoreConfig;
/// use core_service::bootstrap_desktop;
///
/// let config = CoreConfig::builder()
///     .store_url("https://records.example.com/api")
///     .api_key("secret")
///     .build()?;
/// let core = bootstrap_desktop(config)?;
/// let songs = core.songs().clone();
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(mut config: CoreConfig) -> Result<CoreService> {
    if let Err(err) = core_runtime::logging::init_logging(config.logging.clone()) {
        tracing::debug!(error = %err, "Logging already initialized");
    }

    if config.http_client.is_none() {
        let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.store.request_timeout)
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        config.http_client = Some(Arc::new(client));
    }

    CoreService::from_config(config)
}
