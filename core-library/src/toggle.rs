//! Relationship Toggle
//!
//! Boolean relationships (follows, likes, memberships) live as rows in join
//! collections. Reading, linking and unlinking a pair is a check-then-act
//! sequence against a store without transactions, so every mutating entry
//! point runs inside the per-pair critical section from [`KeyedLocks`].
//!
//! Convergence rules:
//! - unlinking deletes every row for the pair, which also heals duplicates
//!   left behind by other processes;
//! - a create rejected by a store uniqueness constraint re-reads the pair and
//!   reports it as linked when a row is now present;
//! - a failed delete re-reads the pair and reports it as unlinked when no row
//!   survived.

use crate::error::{LibraryError, PartialFailure, Result};
use crate::locks::{KeyedLocks, LockKey};
use bridge_traits::store::{
    record_id, Condition, FetchQuery, MutationOutcome, Record, RecordId, StoreGateway, ID_FIELD,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A join collection keyed by an ordered pair of foreign ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    pub collection: &'static str,
    pub left: &'static str,
    pub right: &'static str,
}

impl JoinSpec {
    /// Condition set selecting the rows of one pair.
    pub fn pair_query(&self, left: &Value, right: &Value) -> FetchQuery {
        FetchQuery::new([ID_FIELD, self.left, self.right])
            .filter(Condition::equal_to(self.left, left.clone()))
            .filter(Condition::equal_to(self.right, right.clone()))
    }

    /// A new join row for the pair, plus any extra fields.
    pub fn row(&self, left: &Value, right: &Value, extra: Record) -> Record {
        let mut row = extra;
        row.insert(self.left.to_string(), left.clone());
        row.insert(self.right.to_string(), right.clone());
        row
    }

    pub fn lock_key(&self, left: &Value, right: &Value) -> LockKey {
        LockKey::pair(self.collection, left, right)
    }
}

/// Result of a toggle: the relationship state after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub linked: bool,
}

/// What a create attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCreated {
    /// A new row was written
    Created(Option<RecordId>),
    /// The store refused a duplicate and the pair was found linked on re-read
    AlreadyLinked,
}

/// Per-row result of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<RecordId>,
    pub failed: Vec<RecordId>,
    pub message: Option<String>,
}

impl DeleteReport {
    fn from_outcome(ids: &[RecordId], outcome: &MutationOutcome) -> Self {
        let mut report = Self {
            message: outcome.first_failure_message(),
            ..Self::default()
        };
        for (index, id) in ids.iter().enumerate() {
            match outcome.results.get(index) {
                Some(result) if result.success => report.deleted.push(*id),
                _ => report.failed.push(*id),
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Convert an incomplete report into the matching error.
    pub fn into_result(self, collection: &str, operation: &str) -> Result<Vec<RecordId>> {
        if self.is_complete() {
            return Ok(self.deleted);
        }
        let message = self
            .message
            .unwrap_or_else(|| "store did not confirm the delete".to_string());
        if self.deleted.is_empty() && self.failed.len() == 1 {
            return Err(LibraryError::rejected(collection, message));
        }
        Err(PartialFailure {
            operation: operation.to_string(),
            step: format!("delete from {}", collection),
            succeeded: self.deleted,
            failed: self.failed,
            message,
        }
        .into())
    }
}

#[derive(Clone)]
pub struct RelationshipToggle {
    gateway: Arc<dyn StoreGateway>,
    locks: KeyedLocks,
}

impl RelationshipToggle {
    pub fn new(gateway: Arc<dyn StoreGateway>, locks: KeyedLocks) -> Self {
        Self { gateway, locks }
    }

    /// All rows currently recorded for the pair (normally zero or one).
    pub async fn find_links(
        &self,
        join: &JoinSpec,
        left: &Value,
        right: &Value,
    ) -> Result<Vec<Record>> {
        let rows = self
            .gateway
            .fetch(join.collection, &join.pair_query(left, right))
            .await?;
        if rows.len() > 1 {
            warn!(
                collection = join.collection,
                rows = rows.len(),
                "Duplicate join rows for one pair"
            );
        }
        Ok(rows)
    }

    pub async fn is_linked(
        &self,
        join: &JoinSpec,
        left: impl Into<Value>,
        right: impl Into<Value>,
    ) -> Result<bool> {
        let rows = self.find_links(join, &left.into(), &right.into()).await?;
        Ok(!rows.is_empty())
    }

    /// Flip the relationship and report the resulting state.
    ///
    /// A failure after the existence check leaves the pair in an unknown
    /// state; calling `toggle` again is safe because it re-checks.
    #[instrument(skip(self, left, right), fields(collection = join.collection))]
    pub async fn toggle(
        &self,
        join: &JoinSpec,
        left: impl Into<Value>,
        right: impl Into<Value>,
    ) -> Result<ToggleOutcome> {
        let (left, right) = (left.into(), right.into());
        let _guard = self.locks.lock(join.lock_key(&left, &right)).await;

        let rows = self.find_links(join, &left, &right).await?;
        let linked = if rows.is_empty() {
            self.create_link(join, &left, &right, Record::new()).await?;
            true
        } else {
            self.delete_links(join, &left, &right, &rows).await?;
            false
        };

        info!(linked, "Toggled relationship");
        Ok(ToggleOutcome { linked })
    }

    /// Ensure the pair is linked. Returns `true` when a row was created.
    pub async fn link(
        &self,
        join: &JoinSpec,
        left: impl Into<Value>,
        right: impl Into<Value>,
    ) -> Result<bool> {
        let (left, right) = (left.into(), right.into());
        let _guard = self.locks.lock(join.lock_key(&left, &right)).await;

        if !self.find_links(join, &left, &right).await?.is_empty() {
            return Ok(false);
        }
        let created = self.create_link(join, &left, &right, Record::new()).await?;
        Ok(matches!(created, LinkCreated::Created(_)))
    }

    /// Ensure the pair is unlinked. Returns the number of rows removed.
    pub async fn unlink(
        &self,
        join: &JoinSpec,
        left: impl Into<Value>,
        right: impl Into<Value>,
    ) -> Result<usize> {
        let (left, right) = (left.into(), right.into());
        let _guard = self.locks.lock(join.lock_key(&left, &right)).await;

        let rows = self.find_links(join, &left, &right).await?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.delete_links(join, &left, &right, &rows).await?;
        Ok(rows.len())
    }

    /// Write one join row. Callers hold the lock covering the pair.
    pub(crate) async fn create_link(
        &self,
        join: &JoinSpec,
        left: &Value,
        right: &Value,
        extra: Record,
    ) -> Result<LinkCreated> {
        let row = join.row(left, right, extra);
        let outcome = self.gateway.create(join.collection, vec![row]).await?;

        let Some(result) = outcome.first() else {
            return Err(LibraryError::rejected(
                join.collection,
                "store returned no result for the created row",
            ));
        };

        if result.success {
            debug!(collection = join.collection, id = ?result.id(), "Created join row");
            return Ok(LinkCreated::Created(result.id()));
        }

        if result.is_duplicate() {
            // Another writer got there first; converge on what the store holds
            if !self.find_links(join, left, right).await?.is_empty() {
                debug!(collection = join.collection, "Duplicate create, pair already linked");
                return Ok(LinkCreated::AlreadyLinked);
            }
        }

        Err(LibraryError::rejected(
            join.collection,
            result
                .message
                .clone()
                .unwrap_or_else(|| "create failed".to_string()),
        ))
    }

    /// Delete the given rows of one pair, converging when they are already gone.
    async fn delete_links(
        &self,
        join: &JoinSpec,
        left: &Value,
        right: &Value,
        rows: &[Record],
    ) -> Result<()> {
        let ids: Vec<RecordId> = rows.iter().filter_map(record_id).collect();
        let report = self.delete_rows(join.collection, &ids).await?;
        if report.is_complete() {
            return Ok(());
        }

        if self.find_links(join, left, right).await?.is_empty() {
            debug!(collection = join.collection, "Rows already removed by another writer");
            return Ok(());
        }
        report.into_result(join.collection, "unlink").map(|_| ())
    }

    /// Batch delete with a per-row report. Only transport failures are errors.
    pub(crate) async fn delete_rows(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<DeleteReport> {
        if ids.is_empty() {
            return Ok(DeleteReport::default());
        }
        let outcome = self.gateway.delete(collection, ids).await?;
        Ok(DeleteReport::from_outcome(ids, &outcome))
    }
}
