//! Entity Resolver
//!
//! Two-hop lookups over a join collection: read the join rows filtered by one
//! foreign key, then read the target entities whose ids those rows point at.

use crate::error::Result;
use crate::models::{decode_all, StoreModel};
use crate::query::fetch_all_pages;
use bridge_traits::store::{
    record_id, value_as_id, Condition, FetchQuery, Record, RecordId, StoreGateway, ID_FIELD,
};
use core_runtime::config::DEFAULT_RECONCILE_PAGE_SIZE;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How to walk from a filter value to target ids through a join collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub join_collection: &'static str,
    /// Join field matched against the filter value
    pub filter_field: &'static str,
    /// Join field holding the target entity id
    pub target_field: &'static str,
}

/// Keep the first occurrence of every id.
pub fn dedupe_ids<I: IntoIterator<Item = RecordId>>(ids: I) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[derive(Clone)]
pub struct EntityResolver {
    gateway: Arc<dyn StoreGateway>,
    page_size: u32,
}

impl EntityResolver {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self::with_page_size(gateway, DEFAULT_RECONCILE_PAGE_SIZE)
    }

    /// Join rows are read in pages of `page_size`.
    pub fn with_page_size(gateway: Arc<dyn StoreGateway>, page_size: u32) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
        }
    }

    /// Target records related to `filter_value`, in store order.
    ///
    /// No join rows means no second request. Duplicate join rows pointing at
    /// the same target yield that target once.
    #[instrument(skip(self, target_fields), fields(join = relation.join_collection))]
    pub async fn resolve_related(
        &self,
        relation: &Relation,
        filter_value: Value,
        target_collection: &str,
        target_fields: &[&str],
    ) -> Result<Vec<Record>> {
        let join_query = FetchQuery::new([relation.target_field])
            .filter(Condition::equal_to(relation.filter_field, filter_value));
        let rows = fetch_all_pages(
            self.gateway.as_ref(),
            relation.join_collection,
            join_query,
            self.page_size,
        )
        .await?;

        let ids = dedupe_ids(rows.iter().filter_map(|row| {
            let id = row.get(relation.target_field).and_then(value_as_id);
            if id.is_none() {
                warn!(row = ?record_id(row), "Join row without a usable target id");
            }
            id
        }));

        if ids.is_empty() {
            debug!("No join rows, skipping target fetch");
            return Ok(Vec::new());
        }

        let target_query = FetchQuery::new(target_fields.iter().copied())
            .filter(Condition::one_of(ID_FIELD, ids.iter().copied()));
        let targets = self.gateway.fetch(target_collection, &target_query).await?;
        debug!(count = targets.len(), "Resolved related records");
        Ok(targets)
    }

    /// Typed form of [`resolve_related`](Self::resolve_related).
    pub async fn resolve<T: StoreModel>(
        &self,
        relation: &Relation,
        filter_value: impl Into<Value>,
    ) -> Result<Vec<T>> {
        let records = self
            .resolve_related(relation, filter_value.into(), T::COLLECTION, T::FIELDS)
            .await?;
        decode_all(records)
    }

    /// Fetch the records for `ids` and return them in the order of `ids`.
    ///
    /// Ids absent from the store are skipped; repeated ids appear once.
    pub async fn resolve_ordered<T: StoreModel>(&self, ids: &[RecordId]) -> Result<Vec<T>> {
        let ids = dedupe_ids(ids.iter().copied());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = FetchQuery::new(T::FIELDS.iter().copied())
            .filter(Condition::one_of(ID_FIELD, ids.iter().copied()));
        let mut by_id: HashMap<RecordId, Record> = self
            .gateway
            .fetch(T::COLLECTION, &query)
            .await?
            .into_iter()
            .filter_map(|record| record_id(&record).map(|id| (id, record)))
            .collect();

        let ordered = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        decode_all(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Song, LIKED_SONGS};
    use crate::test_support::{record, MockGateway};
    use bridge_traits::store::Operator;
    use serde_json::json;

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        assert_eq!(dedupe_ids([3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_no_join_rows_skips_second_fetch() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .withf(|collection, _| collection == "song_like_c")
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let resolver = EntityResolver::new(Arc::new(gateway));
        let songs: Vec<Song> = resolver.resolve(&LIKED_SONGS, "user-1").await.unwrap();
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_join_rows_resolve_once() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "song_like_c"
                    && query.fields == vec!["song_id_c".to_string()]
                    && query.conditions[0].values == vec![json!("user-1")]
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record(json!({ "Id": 1, "song_id_c": 10 })),
                    record(json!({ "Id": 2, "song_id_c": 10 })),
                    record(json!({ "Id": 3, "song_id_c": "11" })),
                ])
            });
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                let condition = &query.conditions[0];
                collection == "song_c"
                    && condition.operator == Operator::ExactMatch
                    && condition.include
                    && condition.values == vec![json!(10), json!(11)]
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record(json!({ "Id": 10, "Name": "Ten" })),
                    record(json!({ "Id": 11, "Name": "Eleven" })),
                ])
            });

        let resolver = EntityResolver::new(Arc::new(gateway));
        let songs: Vec<Song> = resolver.resolve(&LIKED_SONGS, "user-1").await.unwrap();
        assert_eq!(songs.iter().map(|s| s.id).collect::<Vec<_>>(), vec![10, 11]);
    }

    #[tokio::test]
    async fn test_resolve_ordered_follows_requested_order() {
        let mut gateway = MockGateway::new();
        gateway.expect_fetch().times(1).returning(|_, _| {
            Ok(vec![
                record(json!({ "Id": 1, "Name": "One" })),
                record(json!({ "Id": 2, "Name": "Two" })),
            ])
        });

        let resolver = EntityResolver::new(Arc::new(gateway));
        let songs: Vec<Song> = resolver.resolve_ordered(&[2, 99, 1, 2]).await.unwrap();
        assert_eq!(songs.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_join_rows_read_across_pages() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "song_like_c" && query.page.is_some_and(|p| p.offset == 0)
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record(json!({ "Id": 1, "song_id_c": 10 })),
                    record(json!({ "Id": 2, "song_id_c": 11 })),
                ])
            });
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "song_like_c" && query.page.is_some_and(|p| p.offset == 2)
            })
            .times(1)
            .returning(|_, _| Ok(vec![record(json!({ "Id": 3, "song_id_c": 12 }))]));
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "song_c"
                    && query.conditions[0].values == vec![json!(10), json!(11), json!(12)]
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record(json!({ "Id": 10, "Name": "Ten" })),
                    record(json!({ "Id": 11, "Name": "Eleven" })),
                    record(json!({ "Id": 12, "Name": "Twelve" })),
                ])
            });

        let resolver = EntityResolver::with_page_size(Arc::new(gateway), 2);
        let songs: Vec<Song> = resolver.resolve(&LIKED_SONGS, "user-1").await.unwrap();
        assert_eq!(songs.len(), 3);
    }
}
