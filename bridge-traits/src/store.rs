//! Record Store Abstraction
//!
//! The generic remote collection interface every higher layer is written
//! against. The store offers only independent CRUD primitives:
//!
//! - `fetch` with AND-combined conditions, an optional OR group, ordering and paging
//! - `get_by_id`
//! - batch `create` / `update` / `delete` with per-record outcomes
//!
//! There are no joins, no foreign keys, no multi-record atomicity and no
//! native increment. A batch mutation may partially succeed, so mutation
//! results are always reported per record.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::store::{Condition, FetchQuery, StoreGateway};
//!
//! let query = FetchQuery::new(["Id", "song_id_c"])
//!     .filter(Condition::equal_to("playlist_id_c", 7));
//! let rows = gateway.fetch("playlist_song_c", &query).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Store-assigned record identifier.
pub type RecordId = i64;

/// A raw store record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Name of the identifier field carried by every record.
pub const ID_FIELD: &str = "Id";

/// Outcome code a store reports when a create violates a uniqueness constraint.
pub const DUPLICATE_RECORD: &str = "DUPLICATE_RECORD";

/// Extract the record id, accepting numeric strings as well as numbers.
pub fn record_id(record: &Record) -> Option<RecordId> {
    record.get(ID_FIELD).and_then(value_as_id)
}

/// Interpret a JSON value as a record id.
pub fn value_as_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Predicate operators understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Field equals the single value.
    EqualTo,
    /// Field contains the value as a case-insensitive substring.
    Contains,
    /// Field is (or, with `include = false`, is not) one of the values.
    ExactMatch,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub values: Vec<Value>,
    /// Only meaningful for `ExactMatch`.
    pub include: bool,
}

impl Condition {
    pub fn equal_to(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::EqualTo,
            values: vec![value.into()],
            include: true,
        }
    }

    pub fn contains(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Contains,
            values: vec![Value::String(term.into())],
            include: true,
        }
    }

    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field: field.into(),
            operator: Operator::ExactMatch,
            values: values.into_iter().map(Into::into).collect(),
            include: true,
        }
    }

    pub fn none_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            include: false,
            ..Self::one_of(field, values)
        }
    }

    /// Evaluate the predicate against a record.
    ///
    /// This is the reference semantics of the contract; remote stores are
    /// expected to behave the same way. Missing fields compare as `null`.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match self.operator {
            Operator::EqualTo => self.values.iter().any(|v| values_equal(actual, v)),
            Operator::Contains => {
                let Some(haystack) = value_as_text(actual) else {
                    return false;
                };
                let haystack = haystack.to_lowercase();
                self.values.iter().any(|needle| {
                    value_as_text(needle)
                        .map(|n| haystack.contains(&n.to_lowercase()))
                        .unwrap_or(false)
                })
            }
            Operator::ExactMatch => {
                let found = self.values.iter().any(|v| values_equal(actual, v));
                found == self.include
            }
        }
    }
}

/// Loose equality: numbers and numeric strings compare by value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (value_as_id(a), value_as_id(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => false,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Sort direction for `OrderBy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Limit/offset paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub limit: u32,
    pub offset: u32,
}

/// A fetch request against one collection.
///
/// `conditions` are AND-combined; `any_of`, when non-empty, adds one OR group
/// that must also hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub fields: Vec<String>,
    pub conditions: Vec<Condition>,
    pub any_of: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub page: Option<Paging>,
}

impl FetchQuery {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn any(mut self, condition: Condition) -> Self {
        self.any_of.push(condition);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.page = Some(Paging { limit, offset });
        self
    }

    pub fn limit(self, limit: u32) -> Self {
        self.page(limit, 0)
    }

    /// Whether a record satisfies every condition and the OR group.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
            && (self.any_of.is_empty() || self.any_of.iter().any(|c| c.matches(record)))
    }
}

// =============================================================================
// Mutation outcomes
// =============================================================================

/// Outcome of a single record inside a batch mutation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RecordOutcome {
    pub fn ok(data: Record) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            code: Some(DUPLICATE_RECORD.to_string()),
            ..Self::failed(message)
        }
    }

    /// True when the store refused the record because of a uniqueness constraint.
    pub fn is_duplicate(&self) -> bool {
        self.code.as_deref() == Some(DUPLICATE_RECORD)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.data.as_ref().and_then(record_id)
    }
}

/// Per-record results of a batch mutation, in request order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub results: Vec<RecordOutcome>,
}

impl MutationOutcome {
    pub fn new(results: Vec<RecordOutcome>) -> Self {
        Self { results }
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Ids of the records that were successfully written.
    pub fn succeeded_ids(&self) -> Vec<RecordId> {
        self.succeeded().filter_map(RecordOutcome::id).collect()
    }

    pub fn first(&self) -> Option<&RecordOutcome> {
        self.results.first()
    }

    /// First failure message, for error reporting.
    pub fn first_failure_message(&self) -> Option<String> {
        self.failed().find_map(|r| r.message.clone())
    }
}

// =============================================================================
// Gateway trait
// =============================================================================

/// Generic remote record store.
///
/// Every method is a single request/response over a network boundary and may
/// fail with a transport or server error. Implementations must report batch
/// results per record rather than collapsing a partial success into an error.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Fetch records matching the query, projected to `query.fields` (plus `Id`).
    async fn fetch(&self, collection: &str, query: &FetchQuery) -> Result<Vec<Record>>;

    /// Fetch one record by id; `Ok(None)` when it does not exist.
    async fn get_by_id(
        &self,
        collection: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Option<Record>>;

    /// Create records; successful outcomes carry the stored record with its `Id`.
    async fn create(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome>;

    /// Update records; each record must carry `Id`. Only the given fields change.
    async fn update(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome>;

    /// Delete records by id.
    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<MutationOutcome>;
}
