use crate::error::{LibraryError, Result};
use crate::locks::KeyedLocks;
use crate::models::{ChartEntry, Song, StoreModel, LIKED_SONGS, SONG_LIKES};
use crate::query::QueryBuilder;
use crate::resolver::EntityResolver;
use crate::toggle::{RelationshipToggle, ToggleOutcome};
use bridge_traits::store::{RecordId, StoreGateway};
use core_runtime::config::QueryLimits;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Song catalog reads and likes.
#[derive(Clone)]
pub struct SongService {
    queries: QueryBuilder,
    links: RelationshipToggle,
    resolver: EntityResolver,
    limits: QueryLimits,
}

impl SongService {
    pub fn new(gateway: Arc<dyn StoreGateway>, locks: KeyedLocks, limits: QueryLimits) -> Self {
        Self {
            queries: QueryBuilder::new(Arc::clone(&gateway)),
            links: RelationshipToggle::new(Arc::clone(&gateway), locks),
            resolver: EntityResolver::new(gateway),
            limits,
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Song>> {
        self.queries.all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<Option<Song>> {
        self.queries.by_id(id).await
    }

    /// Preview URL of the song, or `None` when it does not exist.
    pub async fn preview_url(&self, id: RecordId) -> Result<Option<String>> {
        Ok(self.get_by_id(id).await?.map(|song| song.preview_url()))
    }

    pub async fn get_by_genre(&self, genre: &str) -> Result<Vec<Song>> {
        self.queries.by_field(Song::GENRE, genre).await
    }

    /// Case-insensitive search over title, artist and album.
    pub async fn search(&self, text: &str) -> Result<Vec<Song>> {
        self.queries.search(text).await
    }

    /// Most played songs; `None` uses the configured default.
    pub async fn top_charts(&self, limit: Option<u32>) -> Result<Vec<ChartEntry>> {
        self.queries
            .top_charts(limit.unwrap_or(self.limits.top_charts))
            .await
    }

    /// Like or unlike a song for a user.
    #[instrument(skip(self))]
    pub async fn toggle_like(&self, song_id: RecordId, user_id: &str) -> Result<ToggleOutcome> {
        if self.get_by_id(song_id).await?.is_none() {
            return Err(LibraryError::not_found(Song::ENTITY, song_id));
        }
        self.links.toggle(&SONG_LIKES, song_id, user_id).await
    }

    /// Display hint only: store failures read as "not liked".
    pub async fn is_liked(&self, song_id: RecordId, user_id: &str) -> bool {
        match self.links.is_linked(&SONG_LIKES, song_id, user_id).await {
            Ok(liked) => liked,
            Err(e) => {
                warn!(song_id, error = %e, "Could not read like state");
                false
            }
        }
    }

    pub async fn liked_songs(&self, user_id: &str) -> Result<Vec<Song>> {
        self.resolver.resolve(&LIKED_SONGS, user_id).await
    }
}
