use crate::error::{LibraryError, Result};
use crate::locks::KeyedLocks;
use crate::membership::{MembershipManager, MembershipUpdate};
use crate::models::{NewPlaylist, Playlist, PlaylistUpdate, PlaylistWithSongs, Song, StoreModel};
use crate::query::QueryBuilder;
use crate::resolver::EntityResolver;
use bridge_traits::store::{RecordId, StoreGateway};
use core_runtime::config::{ConsistencyConfig, QueryLimits};
use std::sync::Arc;
use tracing::{info, instrument};

/// Playlist CRUD and ordered membership.
#[derive(Clone)]
pub struct PlaylistService {
    gateway: Arc<dyn StoreGateway>,
    queries: QueryBuilder,
    membership: MembershipManager,
    resolver: EntityResolver,
    limits: QueryLimits,
}

impl PlaylistService {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        locks: KeyedLocks,
        consistency: ConsistencyConfig,
        limits: QueryLimits,
    ) -> Self {
        Self {
            queries: QueryBuilder::new(Arc::clone(&gateway)),
            membership: MembershipManager::with_page_size(
                Arc::clone(&gateway),
                locks,
                consistency.reconcile_page_size,
            ),
            resolver: EntityResolver::new(Arc::clone(&gateway)),
            gateway,
            limits,
        }
    }

    /// The membership manager backing this service.
    pub fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    pub async fn get_all(&self) -> Result<Vec<Playlist>> {
        self.queries.all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<Option<Playlist>> {
        self.queries.by_id(id).await
    }

    /// The playlist with its songs in position order.
    pub async fn get_with_songs(&self, id: RecordId) -> Result<Option<PlaylistWithSongs>> {
        let Some(playlist) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let song_ids = self.membership.ordered_song_ids(id).await?;
        let songs = self.resolver.resolve_ordered::<Song>(&song_ids).await?;
        Ok(Some(PlaylistWithSongs { playlist, songs }))
    }

    pub async fn user_playlists(&self, user_id: &str) -> Result<Vec<Playlist>> {
        self.queries.by_field(Playlist::OWNER, user_id).await
    }

    /// `None` uses the configured default.
    pub async fn trending(&self, limit: Option<u32>) -> Result<Vec<Playlist>> {
        self.queries
            .first_page(limit.unwrap_or(self.limits.trending_playlists))
            .await
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: NewPlaylist) -> Result<Playlist> {
        draft.validate()?;

        let record = draft.to_record();
        let outcome = self
            .gateway
            .create(Playlist::COLLECTION, vec![record.clone()])
            .await?;

        match outcome.first() {
            Some(result) if result.success => {
                // Stores may echo only part of the record; fill in what was sent
                let mut stored = record;
                if let Some(data) = result.data.clone() {
                    stored.extend(data);
                }
                let playlist = Playlist::from_record(stored)?;
                info!(id = playlist.id, "Created playlist");
                Ok(playlist)
            }
            result => Err(LibraryError::rejected(
                Playlist::COLLECTION,
                result
                    .and_then(|r| r.message.clone())
                    .unwrap_or_else(|| "create not confirmed".to_string()),
            )),
        }
    }

    /// Change name, description or cover. The song count is not editable.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: RecordId, changes: PlaylistUpdate) -> Result<Playlist> {
        changes.validate()?;
        if self.get_by_id(id).await?.is_none() {
            return Err(LibraryError::not_found(Playlist::ENTITY, id));
        }

        let outcome = self
            .gateway
            .update(Playlist::COLLECTION, vec![changes.to_record(id)])
            .await?;
        if !outcome.all_succeeded() || outcome.results.is_empty() {
            return Err(LibraryError::rejected(
                Playlist::COLLECTION,
                outcome
                    .first_failure_message()
                    .unwrap_or_else(|| "update not confirmed".to_string()),
            ));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::not_found(Playlist::ENTITY, id))
    }

    /// Delete the playlist and its membership rows. `false` when absent.
    pub async fn delete(&self, id: RecordId) -> Result<bool> {
        self.membership.delete_playlist(id).await
    }

    pub async fn add_song(&self, playlist_id: RecordId, song_id: RecordId) -> Result<MembershipUpdate> {
        self.membership.add_member(playlist_id, song_id).await
    }

    pub async fn remove_song(
        &self,
        playlist_id: RecordId,
        song_id: RecordId,
    ) -> Result<MembershipUpdate> {
        self.membership.remove_member(playlist_id, song_id).await
    }

    pub async fn reorder_songs(
        &self,
        playlist_id: RecordId,
        ordered_song_ids: &[RecordId],
    ) -> Result<MembershipUpdate> {
        self.membership.reorder(playlist_id, ordered_song_ids).await
    }

    /// Recompute the song count, e.g. after an update reported `needs_resync`.
    pub async fn resync_song_count(&self, playlist_id: RecordId) -> Result<u64> {
        self.membership.resync(playlist_id).await
    }
}
