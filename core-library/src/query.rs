//! Query Builder
//!
//! Composes store filters for the read paths: multi-field substring search,
//! descending-rank top-N queries, single-field lookups and full paged scans.
//! Search and charts short-circuit on degenerate input without touching the
//! store.

use crate::error::Result;
use crate::models::{decode_all, ChartEntry, Song, StoreModel};
use bridge_traits::store::{
    Condition, FetchQuery, Record, RecordId, SortDirection, StoreGateway, ID_FIELD,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Build an OR-combined, case-insensitive substring search over `fields`.
///
/// Returns `None` for an empty or whitespace-only term: a blank search matches
/// nothing rather than everything.
pub fn substring_search(term: &str, fields: &[&str], projection: &[&str]) -> Option<FetchQuery> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    let term = term.to_lowercase();

    let query = fields.iter().fold(
        FetchQuery::new(projection.iter().copied()),
        |query, field| query.any(Condition::contains(*field, term.clone())),
    );
    Some(query)
}

/// Build a top-`n` query ordered by `rank_field` descending. `None` when `n == 0`.
pub fn top_n(rank_field: &str, n: u32, projection: &[&str]) -> Option<FetchQuery> {
    if n == 0 {
        return None;
    }
    Some(
        FetchQuery::new(projection.iter().copied())
            .order_by(rank_field, SortDirection::Desc)
            .limit(n),
    )
}

/// Fetch every record matching `query`, one page of `page_size` at a time.
///
/// Pages are ordered by id so that offsets stay stable between requests. A
/// store that ignores paging and answers with more than a page is taken to
/// have returned everything.
pub async fn fetch_all_pages(
    gateway: &dyn StoreGateway,
    collection: &str,
    query: FetchQuery,
    page_size: u32,
) -> Result<Vec<Record>> {
    let page_size = page_size.max(1);
    let base = if query.order_by.is_empty() {
        query.order_by(ID_FIELD, SortDirection::Asc)
    } else {
        query
    };

    let mut records = Vec::new();
    let mut offset = 0u32;
    loop {
        let page = base.clone().page(page_size, offset);
        let batch = gateway.fetch(collection, &page).await?;
        let received = batch.len();
        records.extend(batch);

        if received != page_size as usize {
            break;
        }
        offset = offset.saturating_add(page_size);
    }

    debug!(collection, count = records.len(), "Fetched all pages");
    Ok(records)
}

/// Typed read paths over the store.
#[derive(Clone)]
pub struct QueryBuilder {
    gateway: Arc<dyn StoreGateway>,
}

impl QueryBuilder {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self { gateway }
    }

    /// Run `query` against `T`'s collection.
    pub async fn fetch<T: StoreModel>(&self, query: &FetchQuery) -> Result<Vec<T>> {
        let records = self.gateway.fetch(T::COLLECTION, query).await?;
        decode_all(records)
    }

    /// Every record of `T`.
    pub async fn all<T: StoreModel>(&self) -> Result<Vec<T>> {
        self.fetch(&FetchQuery::new(T::FIELDS.iter().copied()))
            .await
    }

    pub async fn by_id<T: StoreModel>(&self, id: RecordId) -> Result<Option<T>> {
        let fields: Vec<String> = T::FIELDS.iter().map(|f| f.to_string()).collect();
        self.gateway
            .get_by_id(T::COLLECTION, id, &fields)
            .await?
            .map(T::from_record)
            .transpose()
    }

    /// Records whose `field` equals `value`.
    pub async fn by_field<T: StoreModel>(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>> {
        let query =
            FetchQuery::new(T::FIELDS.iter().copied()).filter(Condition::equal_to(field, value));
        self.fetch(&query).await
    }

    /// The `n` records with the highest `rank_field`.
    pub async fn top_by<T: StoreModel>(&self, rank_field: &str, n: u32) -> Result<Vec<T>> {
        match top_n(rank_field, n, T::FIELDS) {
            Some(query) => self.fetch(&query).await,
            None => Ok(Vec::new()),
        }
    }

    /// The first `n` records in store order.
    pub async fn first_page<T: StoreModel>(&self, n: u32) -> Result<Vec<T>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.fetch(&FetchQuery::new(T::FIELDS.iter().copied()).limit(n))
            .await
    }

    /// Songs whose title, artist or album contains `text`, ignoring case.
    #[instrument(skip(self))]
    pub async fn search(&self, text: &str) -> Result<Vec<Song>> {
        let Some(query) =
            substring_search(text, &[Song::TITLE, Song::ARTIST, Song::ALBUM], Song::FIELDS)
        else {
            debug!("Blank search term, skipping store call");
            return Ok(Vec::new());
        };
        self.fetch(&query).await
    }

    /// The `n` most played songs with dense ranks `1..=len`.
    ///
    /// Ties keep the store's order; ranks follow position, not play count.
    #[instrument(skip(self))]
    pub async fn top_charts(&self, n: u32) -> Result<Vec<ChartEntry>> {
        let songs: Vec<Song> = self.top_by(Song::PLAY_COUNT, n).await?;
        Ok(songs
            .into_iter()
            .zip(1u32..)
            .map(|(song, rank)| ChartEntry { rank, song })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, MockGateway};
    use bridge_traits::store::Operator;
    use serde_json::json;

    #[test]
    fn test_blank_terms_build_nothing() {
        assert!(substring_search("", &["Name"], &["Id"]).is_none());
        assert!(substring_search("   \t", &["Name"], &["Id"]).is_none());
    }

    #[test]
    fn test_search_is_lowercased_or_group() {
        let query = substring_search("  Daft PUNK ", &["Name", "artist_c"], &["Id"]).unwrap();

        assert!(query.conditions.is_empty());
        assert_eq!(query.any_of.len(), 2);
        for condition in &query.any_of {
            assert_eq!(condition.operator, Operator::Contains);
            assert_eq!(condition.values, vec![json!("daft punk")]);
        }
    }

    #[test]
    fn test_top_n_orders_descending() {
        assert!(top_n("play_count_c", 0, &["Id"]).is_none());

        let query = top_n("play_count_c", 5, &["Id"]).unwrap();
        assert_eq!(query.order_by[0].direction, SortDirection::Desc);
        assert_eq!(query.page.unwrap().limit, 5);
    }

    #[tokio::test]
    async fn test_empty_search_issues_no_call() {
        // No expectations: any store call would panic
        let gateway = MockGateway::new();
        let queries = QueryBuilder::new(Arc::new(gateway));

        assert!(queries.search("").await.unwrap().is_empty());
        assert!(queries.search("   ").await.unwrap().is_empty());
        assert!(queries.top_charts(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_charts_ranks_by_position() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .withf(|collection, query| {
                collection == "song_c"
                    && query.order_by[0].field == "play_count_c"
                    && query.page.map(|p| p.limit) == Some(3)
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record(json!({ "Id": 5, "Name": "A", "play_count_c": 90 })),
                    record(json!({ "Id": 2, "Name": "B", "play_count_c": 90 })),
                    record(json!({ "Id": 9, "Name": "C", "play_count_c": 10 })),
                ])
            });

        let charts = QueryBuilder::new(Arc::new(gateway))
            .top_charts(3)
            .await
            .unwrap();

        let ranks: Vec<(u32, RecordId)> = charts.iter().map(|e| (e.rank, e.song.id)).collect();
        assert_eq!(ranks, vec![(1, 5), (2, 2), (3, 9)]);
    }

    #[tokio::test]
    async fn test_fetch_all_pages_walks_offsets() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .returning(|_, query| {
                let page = query.page.unwrap();
                let total = 5u32;
                let ids = (page.offset..total.min(page.offset + page.limit))
                    .map(|id| record(json!({ "Id": id })))
                    .collect();
                Ok(ids)
            })
            .times(3);

        let records = fetch_all_pages(&gateway, "playlist_song_c", FetchQuery::new(["Id"]), 2)
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
    }
}
