//! Record store wire types
//!
//! Request and response bodies exchanged with the hosted record store. Field
//! casing follows the store's API exactly, which mixes `PascalCase` (top-level
//! `where` conditions, `RecordIds`) with `camelCase` (OR groups, ordering).

use bridge_traits::store::{
    Condition, FetchQuery, Operator, Record, RecordId, RecordOutcome, SortDirection, ID_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One projected field: `{"field": {"Name": "..."}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub field: FieldName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldName {
    #[serde(rename = "Name")]
    pub name: String,
}

/// AND-combined condition in the top-level `where` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WhereCondition {
    pub field_name: String,
    pub operator: Operator,
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<bool>,
}

impl From<&Condition> for WhereCondition {
    fn from(condition: &Condition) -> Self {
        Self {
            field_name: condition.field.clone(),
            operator: condition.operator,
            values: condition.values.clone(),
            include: (condition.operator == Operator::ExactMatch).then_some(condition.include),
        }
    }
}

/// Condition inside an OR sub-group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCondition {
    pub field_name: String,
    pub operator: Operator,
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<bool>,
}

impl From<&Condition> for GroupCondition {
    fn from(condition: &Condition) -> Self {
        Self {
            field_name: condition.field.clone(),
            operator: condition.operator,
            values: condition.values.clone(),
            include: (condition.operator == Operator::ExactMatch).then_some(condition.include),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubGroup {
    pub conditions: Vec<GroupCondition>,
}

/// OR group: a record matches when any sub-group matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereGroups {
    pub operator: &'static str,
    pub sub_groups: Vec<SubGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderByEntry {
    pub field_name: String,
    pub sorttype: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagingInfo {
    pub limit: u32,
    pub offset: u32,
}

/// Body of `POST /records/fetch`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest<'a> {
    pub collection: &'a str,
    pub fields: Vec<FieldSpec>,
    #[serde(rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub where_: Vec<WhereCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_groups: Option<WhereGroups>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderByEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging_info: Option<PagingInfo>,
}

impl<'a> FetchRequest<'a> {
    pub fn new(collection: &'a str, query: &FetchQuery) -> Self {
        let where_groups = (!query.any_of.is_empty()).then(|| WhereGroups {
            operator: "OR",
            sub_groups: query
                .any_of
                .iter()
                .map(|c| SubGroup {
                    conditions: vec![c.into()],
                })
                .collect(),
        });

        Self {
            collection,
            fields: field_specs(&query.fields),
            where_: query.conditions.iter().map(Into::into).collect(),
            where_groups,
            order_by: query
                .order_by
                .iter()
                .map(|o| OrderByEntry {
                    field_name: o.field.clone(),
                    sorttype: match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    },
                })
                .collect(),
            paging_info: query.page.map(|p| PagingInfo {
                limit: p.limit,
                offset: p.offset,
            }),
        }
    }
}

/// Body of `POST /records/get`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetRequest<'a> {
    pub collection: &'a str,
    pub id: RecordId,
    pub fields: Vec<FieldSpec>,
}

/// Body of `POST /records/create` and `POST /records/update`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordsRequest<'a> {
    pub collection: &'a str,
    pub records: Vec<Record>,
}

/// Body of `POST /records/delete`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteRequest<'a> {
    pub collection: &'a str,
    #[serde(rename = "RecordIds")]
    pub record_ids: &'a [RecordId],
}

/// Projection with `Id` always present. An empty list asks for every field.
pub fn field_specs(fields: &[String]) -> Vec<FieldSpec> {
    if fields.is_empty() {
        return Vec::new();
    }
    let with_id = (!fields.iter().any(|f| f == ID_FIELD)).then(|| ID_FIELD.to_string());
    with_id
        .into_iter()
        .chain(fields.iter().cloned())
        .map(|name| FieldSpec {
            field: FieldName { name },
        })
        .collect()
}

/// Response of the read endpoints.
#[derive(Debug, Deserialize)]
pub struct ReadResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of the mutation endpoints.
#[derive(Debug, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Vec<RecordOutcome>>,
    #[serde(default)]
    pub message: Option<String>,
}
