use crate::error::{LibraryError, Result};
use crate::locks::{KeyedLocks, LockKey};
use crate::models::{Artist, StoreModel, ARTIST_FOLLOWER_COUNT, ARTIST_FOLLOWS, FOLLOWED_ARTISTS};
use crate::query::QueryBuilder;
use crate::reconcile::{AggregateReconciler, Reconciliation};
use crate::resolver::EntityResolver;
use crate::toggle::RelationshipToggle;
use bridge_traits::store::{RecordId, StoreGateway};
use core_runtime::config::{ConsistencyConfig, QueryLimits};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Result of a follow toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpdate {
    pub linked: bool,
    /// `Skipped` when follower count reconciliation is disabled
    pub follower_count: Reconciliation,
}

/// Artist catalog reads and follows.
#[derive(Clone)]
pub struct ArtistService {
    queries: QueryBuilder,
    links: RelationshipToggle,
    reconciler: AggregateReconciler,
    resolver: EntityResolver,
    locks: KeyedLocks,
    limits: QueryLimits,
    reconcile_followers: bool,
}

impl ArtistService {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        locks: KeyedLocks,
        consistency: ConsistencyConfig,
        limits: QueryLimits,
    ) -> Self {
        Self {
            queries: QueryBuilder::new(Arc::clone(&gateway)),
            links: RelationshipToggle::new(Arc::clone(&gateway), locks.clone()),
            reconciler: AggregateReconciler::with_page_size(
                Arc::clone(&gateway),
                consistency.reconcile_page_size,
            ),
            resolver: EntityResolver::new(gateway),
            locks,
            limits,
            reconcile_followers: consistency.reconcile_follower_counts,
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Artist>> {
        self.queries.all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<Option<Artist>> {
        self.queries.by_id(id).await
    }

    /// Artists with the most followers; `None` uses the configured default.
    pub async fn featured(&self, limit: Option<u32>) -> Result<Vec<Artist>> {
        self.queries
            .top_by(
                Artist::FOLLOWER_COUNT,
                limit.unwrap_or(self.limits.featured_artists),
            )
            .await
    }

    /// Follow or unfollow an artist, then recompute its follower count.
    #[instrument(skip(self))]
    pub async fn toggle_follow(&self, artist_id: RecordId, user_id: &str) -> Result<FollowUpdate> {
        if self.get_by_id(artist_id).await?.is_none() {
            return Err(LibraryError::not_found(Artist::ENTITY, artist_id));
        }

        let outcome = self.links.toggle(&ARTIST_FOLLOWS, artist_id, user_id).await?;
        let follower_count = if self.reconcile_followers {
            let _guard = self
                .locks
                .lock(LockKey::owner(Artist::COLLECTION, artist_id))
                .await;
            let result = self
                .reconciler
                .reconcile(&ARTIST_FOLLOWER_COUNT, artist_id)
                .await;
            if let Err(e) = &result {
                warn!(artist_id, error = %e, "Follower count reconciliation failed");
            }
            Reconciliation::from_result(result)
        } else {
            Reconciliation::Skipped
        };

        Ok(FollowUpdate {
            linked: outcome.linked,
            follower_count,
        })
    }

    /// Display hint only: store failures read as "not following".
    pub async fn is_following(&self, artist_id: RecordId, user_id: &str) -> bool {
        match self.links.is_linked(&ARTIST_FOLLOWS, artist_id, user_id).await {
            Ok(following) => following,
            Err(e) => {
                warn!(artist_id, error = %e, "Could not read follow state");
                false
            }
        }
    }

    pub async fn followed_artists(&self, user_id: &str) -> Result<Vec<Artist>> {
        self.resolver.resolve(&FOLLOWED_ARTISTS, user_id).await
    }
}
