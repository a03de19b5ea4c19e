//! Membership Manager
//!
//! Ordered playlist membership on top of the relationship toggle and the
//! aggregate reconciler. Every operation holds the playlist's owner lock for
//! its whole duration: membership rows and `song_count` of one playlist are
//! only ever touched by one operation at a time within this process.
//!
//! Positions are explicit. Appends go after the highest existing position,
//! removals leave gaps, and `reorder` rewrites the playlist to positions
//! `0..n`. Reads sort by position and tolerate gaps.
//!
//! ## Reorder
//!
//! The store cannot rewrite several rows atomically, so `reorder` moves the
//! existing rows in stages and never creates or deletes a member:
//!
//! 1. delete surplus rows left for a song that has more than one;
//! 2. move one row per song to positions above every existing position, in
//!    the new order;
//! 3. renumber those rows to `0..n`.
//!
//! A failure in step 2 moves the rows it managed to shift back to where they
//! were. Other failures are reported as
//! [`PartialFailure`](crate::error::PartialFailure). Every song stays a member
//! throughout and calling `reorder` again repairs the positions.

use crate::error::{LibraryError, PartialFailure, Result};
use crate::locks::{KeyedLocks, LockKey};
use crate::models::{
    decode_all, Playlist, PlaylistMember, Song, StoreModel, PLAYLIST_SONGS, PLAYLIST_SONG_COUNT,
};
use crate::query::fetch_all_pages;
use crate::reconcile::{AggregateReconciler, Reconciliation};
use crate::resolver::dedupe_ids;
use crate::toggle::{LinkCreated, RelationshipToggle};
use bridge_traits::store::{Condition, FetchQuery, Record, RecordId, StoreGateway, ID_FIELD};
use core_runtime::config::DEFAULT_RECONCILE_PAGE_SIZE;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a membership operation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Added { position: i64 },
    AlreadyPresent,
    Removed { rows: usize },
    NotPresent,
    Reordered { members: usize },
}

/// A committed membership change and the reconciliation that followed it.
///
/// The change is the primary outcome. A failed reconciliation does not undo
/// it; it only means `song_count` may be stale until [`needs_resync`] clears.
///
/// [`needs_resync`]: MembershipUpdate::needs_resync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub change: MembershipChange,
    pub song_count: Reconciliation,
}

impl MembershipUpdate {
    pub fn needs_resync(&self) -> bool {
        self.song_count.is_failed()
    }
}

#[derive(Clone)]
pub struct MembershipManager {
    gateway: Arc<dyn StoreGateway>,
    links: RelationshipToggle,
    reconciler: AggregateReconciler,
    locks: KeyedLocks,
    page_size: u32,
}

impl MembershipManager {
    pub fn new(gateway: Arc<dyn StoreGateway>, locks: KeyedLocks) -> Self {
        Self::with_page_size(gateway, locks, DEFAULT_RECONCILE_PAGE_SIZE)
    }

    pub fn with_page_size(gateway: Arc<dyn StoreGateway>, locks: KeyedLocks, page_size: u32) -> Self {
        Self {
            links: RelationshipToggle::new(Arc::clone(&gateway), locks.clone()),
            reconciler: AggregateReconciler::with_page_size(Arc::clone(&gateway), page_size),
            gateway,
            locks,
            page_size: page_size.max(1),
        }
    }

    fn lock_key(playlist_id: RecordId) -> LockKey {
        LockKey::owner(Playlist::COLLECTION, playlist_id)
    }

    /// Membership rows in position order (ties by row id).
    pub async fn members(&self, playlist_id: RecordId) -> Result<Vec<PlaylistMember>> {
        let query = FetchQuery::new(PlaylistMember::FIELDS.iter().copied())
            .filter(Condition::equal_to(PLAYLIST_SONGS.left, playlist_id));
        let records = fetch_all_pages(
            self.gateway.as_ref(),
            PLAYLIST_SONGS.collection,
            query,
            self.page_size,
        )
        .await?;

        let mut members: Vec<PlaylistMember> = decode_all(records)?;
        members.sort_by_key(|m| (m.position, m.row_id));
        Ok(members)
    }

    /// Song ids in position order. A song with several rows appears once, at
    /// its first position.
    pub async fn ordered_song_ids(&self, playlist_id: RecordId) -> Result<Vec<RecordId>> {
        let members = self.members(playlist_id).await?;
        Ok(dedupe_ids(members.into_iter().map(|m| m.song_id)))
    }

    /// Append `song_id` to the playlist. Adding a present song is a no-op.
    #[instrument(skip(self))]
    pub async fn add_member(
        &self,
        playlist_id: RecordId,
        song_id: RecordId,
    ) -> Result<MembershipUpdate> {
        let _guard = self.locks.lock(Self::lock_key(playlist_id)).await;

        let members = self.members(playlist_id).await?;
        if members.iter().any(|m| m.song_id == song_id) {
            debug!("Song already in playlist");
            return Ok(MembershipUpdate {
                change: MembershipChange::AlreadyPresent,
                song_count: Reconciliation::Skipped,
            });
        }

        self.ensure_exists::<Playlist>(playlist_id).await?;
        self.ensure_exists::<Song>(song_id).await?;

        let position = members.iter().map(|m| m.position + 1).max().unwrap_or(0);
        let mut extra = Record::new();
        extra.insert(PlaylistMember::POSITION.to_string(), json!(position));

        let created = self
            .links
            .create_link(&PLAYLIST_SONGS, &json!(playlist_id), &json!(song_id), extra)
            .await?;
        if created == LinkCreated::AlreadyLinked {
            return Ok(MembershipUpdate {
                change: MembershipChange::AlreadyPresent,
                song_count: Reconciliation::Skipped,
            });
        }

        info!(position, "Added song to playlist");
        Ok(MembershipUpdate {
            change: MembershipChange::Added { position },
            song_count: self.reconcile_locked(playlist_id).await,
        })
    }

    /// Remove `song_id` from the playlist. Removing an absent song is a no-op.
    ///
    /// Remaining positions are not renumbered.
    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        playlist_id: RecordId,
        song_id: RecordId,
    ) -> Result<MembershipUpdate> {
        let _guard = self.locks.lock(Self::lock_key(playlist_id)).await;

        let rows: Vec<RecordId> = self
            .members(playlist_id)
            .await?
            .into_iter()
            .filter(|m| m.song_id == song_id)
            .map(|m| m.row_id)
            .collect();
        if rows.is_empty() {
            debug!("Song not in playlist");
            return Ok(MembershipUpdate {
                change: MembershipChange::NotPresent,
                song_count: Reconciliation::Skipped,
            });
        }

        let removed = self
            .links
            .delete_rows(PLAYLIST_SONGS.collection, &rows)
            .await?
            .into_result(PLAYLIST_SONGS.collection, "remove_member")?;

        info!(rows = removed.len(), "Removed song from playlist");
        Ok(MembershipUpdate {
            change: MembershipChange::Removed {
                rows: removed.len(),
            },
            song_count: self.reconcile_locked(playlist_id).await,
        })
    }

    /// Rewrite the playlist so that its members read back as `ordered`.
    ///
    /// `ordered` must be a permutation of the current member song ids;
    /// anything else is rejected before the store is written.
    #[instrument(skip(self, ordered), fields(members = ordered.len()))]
    pub async fn reorder(
        &self,
        playlist_id: RecordId,
        ordered: &[RecordId],
    ) -> Result<MembershipUpdate> {
        let _guard = self.locks.lock(Self::lock_key(playlist_id)).await;

        let previous = self.members(playlist_id).await?;
        validate_permutation(&previous, ordered)?;

        if ordered.is_empty() {
            return Ok(MembershipUpdate {
                change: MembershipChange::Reordered { members: 0 },
                song_count: Reconciliation::Skipped,
            });
        }

        let (rows, surplus) = plan_rows(&previous, ordered);
        if !surplus.is_empty() {
            self.remove_surplus(&surplus).await?;
        }

        let base = previous.iter().map(|m| m.position + 1).max().unwrap_or(0);
        self.stage_positions(&previous, &rows, base).await?;
        self.renumber(&rows).await?;

        info!("Reordered playlist");
        Ok(MembershipUpdate {
            change: MembershipChange::Reordered {
                members: rows.len(),
            },
            song_count: self.reconcile_locked(playlist_id).await,
        })
    }

    /// Recompute `song_count` from the membership rows.
    pub async fn resync(&self, playlist_id: RecordId) -> Result<u64> {
        let _guard = self.locks.lock(Self::lock_key(playlist_id)).await;
        self.reconciler
            .reconcile(&PLAYLIST_SONG_COUNT, playlist_id)
            .await
    }

    /// Delete the playlist and its membership rows, rows first so that no
    /// row is ever left pointing at a missing playlist.
    ///
    /// Returns `false` when the playlist did not exist.
    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, playlist_id: RecordId) -> Result<bool> {
        let _guard = self.locks.lock(Self::lock_key(playlist_id)).await;

        let rows: Vec<RecordId> = self
            .members(playlist_id)
            .await?
            .into_iter()
            .map(|m| m.row_id)
            .collect();
        self.links
            .delete_rows(PLAYLIST_SONGS.collection, &rows)
            .await?
            .into_result(PLAYLIST_SONGS.collection, "delete_playlist")?;

        let fields = [ID_FIELD.to_string()];
        if self
            .gateway
            .get_by_id(Playlist::COLLECTION, playlist_id, &fields)
            .await?
            .is_none()
        {
            debug!(rows = rows.len(), "Playlist already gone");
            return Ok(false);
        }

        let outcome = self
            .gateway
            .delete(Playlist::COLLECTION, &[playlist_id])
            .await?;
        if !outcome.all_succeeded() || outcome.results.is_empty() {
            return Err(LibraryError::rejected(
                Playlist::COLLECTION,
                outcome
                    .first_failure_message()
                    .unwrap_or_else(|| "delete not confirmed".to_string()),
            ));
        }

        info!(rows = rows.len(), "Deleted playlist");
        Ok(true)
    }

    async fn ensure_exists<T: StoreModel>(&self, id: RecordId) -> Result<()> {
        let fields = [ID_FIELD.to_string()];
        match self.gateway.get_by_id(T::COLLECTION, id, &fields).await? {
            Some(_) => Ok(()),
            None => Err(LibraryError::not_found(T::ENTITY, id)),
        }
    }

    async fn reconcile_locked(&self, playlist_id: RecordId) -> Reconciliation {
        let result = self
            .reconciler
            .reconcile(&PLAYLIST_SONG_COUNT, playlist_id)
            .await;
        if let Err(e) = &result {
            warn!(playlist_id, error = %e, "Song count reconciliation failed");
        }
        Reconciliation::from_result(result)
    }

    /// Step 1: drop the extra rows of songs that appear more than once.
    async fn remove_surplus(&self, surplus: &[RecordId]) -> Result<()> {
        let report = match self
            .links
            .delete_rows(PLAYLIST_SONGS.collection, surplus)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                return Err(reorder_failure(
                    "remove duplicate rows",
                    Vec::new(),
                    surplus.to_vec(),
                    e.to_string(),
                ))
            }
        };
        if report.is_complete() {
            debug!(rows = surplus.len(), "Removed duplicate membership rows");
            return Ok(());
        }

        let message = report
            .message
            .clone()
            .unwrap_or_else(|| "delete not confirmed".to_string());
        Err(reorder_failure(
            "remove duplicate rows",
            report.deleted,
            report.failed,
            message,
        ))
    }

    /// Step 2: move the rows above the existing positions in the new order.
    async fn stage_positions(
        &self,
        previous: &[PlaylistMember],
        rows: &[(RecordId, RecordId)],
        base: i64,
    ) -> Result<()> {
        let targets: Vec<PositionTarget> = rows
            .iter()
            .zip(base..)
            .map(|(&(song_id, row_id), position)| PositionTarget {
                song_id,
                row_id,
                position,
            })
            .collect();

        let write = match self.write_positions(&targets).await {
            Ok(write) => write,
            Err(e) => {
                return Err(reorder_failure(
                    "stage new order",
                    Vec::new(),
                    song_ids(rows),
                    e.to_string(),
                ))
            }
        };
        if write.failed.is_empty() {
            return Ok(());
        }

        let old_positions: HashMap<RecordId, i64> =
            previous.iter().map(|m| (m.row_id, m.position)).collect();
        let restore: Vec<PositionTarget> = targets
            .iter()
            .filter(|t| write.moved.contains(&t.song_id))
            .filter_map(|t| {
                old_positions.get(&t.row_id).map(|&position| PositionTarget {
                    position,
                    ..*t
                })
            })
            .collect();
        match self.write_positions(&restore).await {
            Ok(restored) if restored.failed.is_empty() => {
                debug!(rows = restore.len(), "Restored previous positions")
            }
            Ok(restored) => warn!(left = ?restored.failed, "Previous positions not fully restored"),
            Err(e) => warn!(error = %e, "Previous positions could not be restored"),
        }

        Err(reorder_failure(
            "stage new order",
            write.moved,
            write.failed,
            write
                .message
                .unwrap_or_else(|| "update not confirmed".to_string()),
        ))
    }

    /// Step 3: move the staged rows to positions `0..n`.
    async fn renumber(&self, rows: &[(RecordId, RecordId)]) -> Result<()> {
        let targets: Vec<PositionTarget> = rows
            .iter()
            .zip(0i64..)
            .map(|(&(song_id, row_id), position)| PositionTarget {
                song_id,
                row_id,
                position,
            })
            .collect();

        let write = match self.write_positions(&targets).await {
            Ok(write) => write,
            Err(e) => {
                return Err(reorder_failure(
                    "renumber positions",
                    Vec::new(),
                    song_ids(rows),
                    e.to_string(),
                ))
            }
        };
        if write.failed.is_empty() {
            return Ok(());
        }
        Err(reorder_failure(
            "renumber positions",
            write.moved,
            write.failed,
            write
                .message
                .unwrap_or_else(|| "update not confirmed".to_string()),
        ))
    }

    /// One batch update of `position_c`, split by per-record outcome.
    async fn write_positions(&self, targets: &[PositionTarget]) -> Result<PositionWrite> {
        if targets.is_empty() {
            return Ok(PositionWrite::default());
        }

        let records: Vec<Record> = targets
            .iter()
            .map(|target| {
                let mut record = Record::new();
                record.insert(ID_FIELD.to_string(), json!(target.row_id));
                record.insert(PlaylistMember::POSITION.to_string(), json!(target.position));
                record
            })
            .collect();
        let outcome = self
            .gateway
            .update(PLAYLIST_SONGS.collection, records)
            .await?;

        let mut write = PositionWrite {
            message: outcome.first_failure_message(),
            ..PositionWrite::default()
        };
        for (index, target) in targets.iter().enumerate() {
            if outcome.results.get(index).is_some_and(|r| r.success) {
                write.moved.push(target.song_id);
            } else {
                write.failed.push(target.song_id);
            }
        }
        Ok(write)
    }
}

#[derive(Debug, Clone, Copy)]
struct PositionTarget {
    song_id: RecordId,
    row_id: RecordId,
    position: i64,
}

/// Song ids whose row did or did not take its new position.
#[derive(Debug, Default)]
struct PositionWrite {
    moved: Vec<RecordId>,
    failed: Vec<RecordId>,
    message: Option<String>,
}

/// Check that `ordered` is exactly the set of distinct member songs.
fn validate_permutation(members: &[PlaylistMember], ordered: &[RecordId]) -> Result<()> {
    let current: HashSet<RecordId> = members.iter().map(|m| m.song_id).collect();

    let mut seen = HashSet::new();
    for song_id in ordered {
        if !seen.insert(*song_id) {
            return Err(LibraryError::validation(
                "ordered_song_ids",
                format!("song {} appears more than once", song_id),
            ));
        }
        if !current.contains(song_id) {
            return Err(LibraryError::validation(
                "ordered_song_ids",
                format!("song {} is not a member of the playlist", song_id),
            ));
        }
    }

    if seen.len() != current.len() {
        let mut missing: Vec<RecordId> = current.difference(&seen).copied().collect();
        missing.sort_unstable();
        return Err(LibraryError::validation(
            "ordered_song_ids",
            format!("missing members: {:?}", missing),
        ));
    }
    Ok(())
}

/// One `(song, row)` pair per song in `ordered`, keeping each song's first row,
/// plus the ids of every other row.
fn plan_rows(
    members: &[PlaylistMember],
    ordered: &[RecordId],
) -> (Vec<(RecordId, RecordId)>, Vec<RecordId>) {
    let mut first_row: HashMap<RecordId, RecordId> = HashMap::new();
    let mut surplus = Vec::new();
    for member in members {
        if first_row.contains_key(&member.song_id) {
            surplus.push(member.row_id);
        } else {
            first_row.insert(member.song_id, member.row_id);
        }
    }

    let rows = ordered
        .iter()
        .filter_map(|song_id| first_row.get(song_id).map(|row| (*song_id, *row)))
        .collect();
    (rows, surplus)
}

fn song_ids(rows: &[(RecordId, RecordId)]) -> Vec<RecordId> {
    rows.iter().map(|(song_id, _)| *song_id).collect()
}

fn reorder_failure(
    step: &str,
    succeeded: Vec<RecordId>,
    failed: Vec<RecordId>,
    message: String,
) -> LibraryError {
    warn!(step, succeeded = succeeded.len(), failed = failed.len(), %message, "Reorder incomplete");
    PartialFailure {
        operation: "reorder".to_string(),
        step: step.to_string(),
        succeeded,
        failed,
        message,
    }
    .into()
}
