//! In-memory record store
//!
//! A [`StoreGateway`] that keeps collections in process memory and follows the
//! reference filter semantics of [`FetchQuery::matches`]. It is meant for tests
//! and for embedders that need a stand-in store:
//!
//! - optional uniqueness constraints, reported with the `DUPLICATE_RECORD` code
//! - one-shot fault injection (transport failures and partial batches)
//! - per-operation call accounting
//!
//! Every call yields to the scheduler before touching state, so concurrent
//! callers interleave the way they would against a remote store.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::store::{
    record_id, FetchQuery, MutationOutcome, Record, RecordId, RecordOutcome, SortDirection,
    StoreGateway, ID_FIELD,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Store operations, for fault injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Fetch,
    GetById,
    Create,
    Update,
    Delete,
}

impl StoreOp {
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

/// What an injected fault does to the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The call fails as if the store were unreachable; nothing is applied.
    Unavailable,
    /// Only the first `n` records of the batch are applied; the rest are
    /// reported as failed.
    PartialBatch(usize),
}

#[derive(Debug)]
struct PendingFault {
    op: StoreOp,
    collection: Option<String>,
    skip: usize,
    fault: Fault,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, BTreeMap<RecordId, Record>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    faults: Vec<PendingFault>,
    calls: HashMap<StoreOp, usize>,
    next_id: RecordId,
}

impl State {
    fn take_fault(&mut self, op: StoreOp, collection: &str) -> Option<Fault> {
        let index = self.faults.iter().position(|f| {
            f.op == op && f.collection.as_deref().map_or(true, |c| c == collection)
        })?;
        if self.faults[index].skip > 0 {
            self.faults[index].skip -= 1;
            return None;
        }
        Some(self.faults.remove(index).fault)
    }

    fn allocate_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn violates_unique(&self, collection: &str, candidate: &Record) -> Option<String> {
        let constraints = self.unique.get(collection)?;
        let rows = self.collections.get(collection);
        constraints.iter().find_map(|fields| {
            let clash = rows.is_some_and(|rows| {
                rows.values().any(|row| {
                    fields.iter().all(|field| {
                        bridge_traits::store::values_equal(
                            row.get(field).unwrap_or(&Value::Null),
                            candidate.get(field).unwrap_or(&Value::Null),
                        )
                    })
                })
            });
            clash.then(|| format!("duplicate value for ({})", fields.join(", ")))
        })
    }
}

/// In-memory [`StoreGateway`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject creates that would repeat the values of `fields` in `collection`.
    pub fn with_unique_constraint(self, collection: &str, fields: &[&str]) -> Self {
        self.state()
            .unique
            .entry(collection.to_string())
            .or_default()
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record directly, bypassing faults and accounting. Returns its id.
    pub fn insert(&self, collection: &str, record: Value) -> RecordId {
        let mut state = self.state();
        let mut record = match record {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        let id = match record_id(&record) {
            Some(id) => {
                let next = state.next_id.max(id);
                state.next_id = next;
                id
            }
            None => state.allocate_id(),
        };
        record.insert(ID_FIELD.to_string(), Value::from(id));
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, record);
        id
    }

    /// Snapshot of a collection in id order.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state()
            .collections
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, collection: &str, id: RecordId) -> Option<Record> {
        self.state()
            .collections
            .get(collection)
            .and_then(|rows| rows.get(&id).cloned())
    }

    /// Overwrite one field, bypassing faults and accounting.
    pub fn set_field(&self, collection: &str, id: RecordId, field: &str, value: Value) {
        if let Some(row) = self
            .state()
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.get_mut(&id))
        {
            row.insert(field.to_string(), value);
        }
    }

    /// Make the next `op` call (on `collection`, or on any collection) fail.
    pub fn fail_next(&self, op: StoreOp, collection: Option<&str>, fault: Fault) {
        self.fail_after(op, collection, 0, fault);
    }

    /// Let `skip` matching calls through, then fail the next one.
    pub fn fail_after(&self, op: StoreOp, collection: Option<&str>, skip: usize, fault: Fault) {
        self.state().faults.push(PendingFault {
            op,
            collection: collection.map(str::to_string),
            skip,
            fault,
        });
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn mutation_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Count the call and consume a matching fault.
    async fn begin(&self, op: StoreOp, collection: &str) -> Result<Option<usize>> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        trace!(?op, collection, "In-memory store call");

        match state.take_fault(op, collection) {
            Some(Fault::Unavailable) => Err(BridgeError::OperationFailed(format!(
                "injected failure: {:?} on {}",
                op, collection
            ))),
            Some(Fault::PartialBatch(n)) => Ok(Some(n)),
            None => Ok(None),
        }
    }
}

fn project(record: &Record, fields: &[String]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(key, _)| key.as_str() == ID_FIELD || fields.iter().any(|f| f == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn injected(index: usize) -> RecordOutcome {
    RecordOutcome::failed(format!("injected failure for record {}", index))
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn fetch(&self, collection: &str, query: &FetchQuery) -> Result<Vec<Record>> {
        self.begin(StoreOp::Fetch, collection).await?;
        let state = self.state();

        let mut rows: Vec<&Record> = state
            .collections
            .get(collection)
            .map(|rows| rows.values().filter(|row| query.matches(row)).collect())
            .unwrap_or_default();

        // Rows start in id order; sort_by is stable, so id breaks ties
        rows.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|order| {
                    let ordering = compare_values(
                        a.get(&order.field).unwrap_or(&Value::Null),
                        b.get(&order.field).unwrap_or(&Value::Null),
                    );
                    match order.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let (offset, limit) = query
            .page
            .map(|p| (p.offset as usize, p.limit as usize))
            .unwrap_or((0, usize::MAX));

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &query.fields))
            .collect())
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Option<Record>> {
        self.begin(StoreOp::GetById, collection).await?;
        Ok(self
            .state()
            .collections
            .get(collection)
            .and_then(|rows| rows.get(&id))
            .map(|row| project(row, fields)))
    }

    async fn create(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome> {
        let applied = self.begin(StoreOp::Create, collection).await?;
        let mut state = self.state();

        let results = records
            .into_iter()
            .enumerate()
            .map(|(index, mut record)| {
                if applied.is_some_and(|n| index >= n) {
                    return injected(index);
                }
                if let Some(message) = state.violates_unique(collection, &record) {
                    return RecordOutcome::duplicate(message);
                }
                let id = state.allocate_id();
                record.insert(ID_FIELD.to_string(), Value::from(id));
                state
                    .collections
                    .entry(collection.to_string())
                    .or_default()
                    .insert(id, record.clone());
                RecordOutcome::ok(record)
            })
            .collect();

        Ok(MutationOutcome::new(results))
    }

    async fn update(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome> {
        let applied = self.begin(StoreOp::Update, collection).await?;
        let mut state = self.state();

        let results = records
            .into_iter()
            .enumerate()
            .map(|(index, changes)| {
                if applied.is_some_and(|n| index >= n) {
                    return injected(index);
                }
                let Some(id) = record_id(&changes) else {
                    return RecordOutcome::failed("record has no Id");
                };
                match state
                    .collections
                    .get_mut(collection)
                    .and_then(|rows| rows.get_mut(&id))
                {
                    Some(row) => {
                        row.extend(changes.into_iter().filter(|(key, _)| key != ID_FIELD));
                        RecordOutcome::ok(row.clone())
                    }
                    None => RecordOutcome::failed(format!("record {} not found", id)),
                }
            })
            .collect();

        Ok(MutationOutcome::new(results))
    }

    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<MutationOutcome> {
        let applied = self.begin(StoreOp::Delete, collection).await?;
        let mut state = self.state();

        let results = ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                if applied.is_some_and(|n| index >= n) {
                    return injected(index);
                }
                match state
                    .collections
                    .get_mut(collection)
                    .and_then(|rows| rows.remove(id))
                {
                    Some(row) => RecordOutcome::ok(row),
                    None => RecordOutcome::failed(format!("record {} not found", id)),
                }
            })
            .collect();

        Ok(MutationOutcome::new(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::store::Condition;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_filters_orders_and_projects() {
        let store = InMemoryStore::new();
        store.insert("song_c", json!({ "Name": "Low", "play_count_c": 3 }));
        store.insert("song_c", json!({ "Name": "High", "play_count_c": 9 }));
        store.insert("song_c", json!({ "Name": "Mid", "play_count_c": 5 }));

        let query = FetchQuery::new(["Name"])
            .filter(Condition::none_of("Name", ["Mid"]))
            .order_by("play_count_c", SortDirection::Desc);
        let rows = store.fetch("song_c", &query).await.unwrap();

        let names: Vec<&Value> = rows.iter().map(|r| &r["Name"]).collect();
        assert_eq!(names, vec![&json!("High"), &json!("Low")]);
        assert!(!rows[0].contains_key("play_count_c"));
        assert!(rows[0].contains_key(ID_FIELD));
    }

    #[tokio::test]
    async fn test_unique_constraint_reports_duplicate() {
        let store = InMemoryStore::new()
            .with_unique_constraint("song_like_c", &["song_id_c", "user_id_c"]);
        let row = |user: &str| {
            let mut row = Record::new();
            row.insert("song_id_c".into(), json!(1));
            row.insert("user_id_c".into(), json!(user));
            row
        };

        let outcome = store
            .create("song_like_c", vec![row("a"), row("a"), row("b")])
            .await
            .unwrap();
        assert!(outcome.results[0].success);
        assert!(outcome.results[1].is_duplicate());
        assert!(outcome.results[2].success);
    }

    #[tokio::test]
    async fn test_injected_faults_are_one_shot() {
        let store = InMemoryStore::new();
        let id = store.insert("genre_c", json!({ "name_c": "Jazz" }));
        store.fail_next(StoreOp::GetById, Some("genre_c"), Fault::Unavailable);

        assert!(store.get_by_id("genre_c", id, &[]).await.is_err());
        assert!(store.get_by_id("genre_c", id, &[]).await.unwrap().is_some());
        assert_eq!(store.calls(StoreOp::GetById), 2);
        assert_eq!(store.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_batch_applies_prefix() {
        let store = InMemoryStore::new();
        let a = store.insert("playlist_song_c", json!({}));
        let b = store.insert("playlist_song_c", json!({}));
        store.fail_next(StoreOp::Delete, None, Fault::PartialBatch(1));

        let outcome = store.delete("playlist_song_c", &[a, b]).await.unwrap();
        assert!(outcome.results[0].success);
        assert!(!outcome.results[1].success);
        assert_eq!(store.records("playlist_song_c").len(), 1);
    }

    #[tokio::test]
    async fn test_delayed_fault_skips_earlier_calls() {
        let store = InMemoryStore::new();
        let id = store.insert("genre_c", json!({ "name_c": "Jazz" }));
        store.fail_after(StoreOp::GetById, Some("genre_c"), 1, Fault::Unavailable);

        assert!(store.get_by_id("genre_c", id, &[]).await.is_ok());
        assert!(store.get_by_id("genre_c", id, &[]).await.is_err());
        assert!(store.get_by_id("genre_c", id, &[]).await.is_ok());
    }
}
