//! Aggregate Reconciler
//!
//! Denormalized counters are never incremented or decremented. Each
//! reconciliation counts the authoritative join rows and overwrites the
//! owner's field, so a skipped or failed earlier reconciliation is corrected
//! by the next one.
//!
//! Reconciliation does not lock. Callers that can race on the same owner hold
//! the owner's [`LockKey`](crate::locks::LockKey) around the call.

use crate::error::{LibraryError, Result};
use crate::query::fetch_all_pages;
use bridge_traits::store::{Condition, FetchQuery, Record, RecordId, StoreGateway, ID_FIELD};
use core_runtime::config::DEFAULT_RECONCILE_PAGE_SIZE;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A count field on an owner derived from rows of a join collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSpec {
    pub owner_collection: &'static str,
    pub aggregate_field: &'static str,
    pub join_collection: &'static str,
    /// Join field holding the owner id
    pub owner_field: &'static str,
}

/// Outcome of the reconciliation that follows a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The aggregate now holds this value
    Converged(u64),
    /// Nothing changed, so no reconciliation was attempted
    Skipped,
    /// The aggregate may be stale until the next successful reconciliation
    Failed { reason: String },
}

impl Reconciliation {
    pub fn from_result(result: Result<u64>) -> Self {
        match result {
            Ok(count) => Self::Converged(count),
            Err(e) => Self::Failed {
                reason: e.to_string(),
            },
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Converged(count) => Some(*count),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged(count) => write!(f, "converged at {}", count),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Clone)]
pub struct AggregateReconciler {
    gateway: Arc<dyn StoreGateway>,
    page_size: u32,
}

impl AggregateReconciler {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self::with_page_size(gateway, DEFAULT_RECONCILE_PAGE_SIZE)
    }

    pub fn with_page_size(gateway: Arc<dyn StoreGateway>, page_size: u32) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
        }
    }

    /// Number of join rows that belong to `owner_id`.
    pub async fn count(&self, spec: &AggregateSpec, owner_id: RecordId) -> Result<u64> {
        let query =
            FetchQuery::new([ID_FIELD]).filter(Condition::equal_to(spec.owner_field, owner_id));
        let rows = fetch_all_pages(
            self.gateway.as_ref(),
            spec.join_collection,
            query,
            self.page_size,
        )
        .await?;
        Ok(rows.len() as u64)
    }

    /// Recompute the aggregate from the join collection and store it.
    ///
    /// When the count cannot be read, the owner is left untouched.
    #[instrument(skip(self), fields(owner = spec.owner_collection, field = spec.aggregate_field))]
    pub async fn reconcile(&self, spec: &AggregateSpec, owner_id: RecordId) -> Result<u64> {
        let count = self.count(spec, owner_id).await?;

        let mut record = Record::new();
        record.insert(ID_FIELD.to_string(), json!(owner_id));
        record.insert(spec.aggregate_field.to_string(), json!(count));

        let outcome = self
            .gateway
            .update(spec.owner_collection, vec![record])
            .await?;

        match outcome.first() {
            Some(result) if result.success => {
                info!(owner_id, count, "Reconciled aggregate");
                Ok(count)
            }
            result => {
                let message = result
                    .and_then(|r| r.message.clone())
                    .unwrap_or_else(|| "update not confirmed".to_string());
                warn!(owner_id, %message, "Aggregate update rejected");

                let exists = self
                    .gateway
                    .get_by_id(spec.owner_collection, owner_id, &[ID_FIELD.to_string()])
                    .await?
                    .is_some();
                if exists {
                    Err(LibraryError::rejected(spec.owner_collection, message))
                } else {
                    Err(LibraryError::not_found(spec.owner_collection, owner_id))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLAYLIST_SONG_COUNT;
    use crate::test_support::{record, MockGateway};
    use bridge_traits::error::BridgeError;
    use bridge_traits::store::{MutationOutcome, RecordOutcome};

    #[tokio::test]
    async fn test_reconcile_overwrites_with_count() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "playlist_song_c" && query.conditions[0].field == "playlist_id_c"
            })
            .returning(|_, query| {
                // Three rows on the first page of two, one on the second
                let page = query.page.unwrap();
                let count = if page.offset == 0 { 2 } else { 1 };
                Ok((0..count).map(|i| record(json!({ "Id": i }))).collect())
            })
            .times(2);
        gateway
            .expect_update()
            .withf(|collection, records| {
                collection == "playlist_c"
                    && records[0]["Id"] == json!(4)
                    && records[0]["song_count_c"] == json!(3)
            })
            .times(1)
            .returning(|_, records| {
                Ok(MutationOutcome::new(vec![RecordOutcome::ok(
                    records[0].clone(),
                )]))
            });

        let reconciler = AggregateReconciler::with_page_size(Arc::new(gateway), 2);
        assert_eq!(reconciler.reconcile(&PLAYLIST_SONG_COUNT, 4).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_count_failure_skips_update() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .returning(|_, _| Err(BridgeError::OperationFailed("timeout".to_string())));
        gateway.expect_update().never();

        let reconciler = AggregateReconciler::new(Arc::new(gateway));
        let err = reconciler
            .reconcile(&PLAYLIST_SONG_COUNT, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_owner_is_not_found() {
        let mut gateway = MockGateway::new();
        gateway.expect_fetch().returning(|_, _| Ok(Vec::new()));
        gateway.expect_update().returning(|_, _| {
            Ok(MutationOutcome::new(vec![RecordOutcome::failed(
                "record not found",
            )]))
        });
        gateway.expect_get_by_id().returning(|_, _, _| Ok(None));

        let reconciler = AggregateReconciler::new(Arc::new(gateway));
        let err = reconciler
            .reconcile(&PLAYLIST_SONG_COUNT, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_reconciliation_from_result() {
        assert_eq!(Reconciliation::from_result(Ok(2)).count(), Some(2));
        let failed = Reconciliation::from_result(Err(LibraryError::not_found("Playlist", 1)));
        assert!(failed.is_failed());
        assert_eq!(failed.count(), None);
    }
}
