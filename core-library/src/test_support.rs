use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::store::{FetchQuery, MutationOutcome, Record, RecordId, StoreGateway};
use mockall::mock;
use serde_json::Value;

mock! {
    pub Gateway {}

    #[async_trait]
    impl StoreGateway for Gateway {
        async fn fetch(&self, collection: &str, query: &FetchQuery) -> Result<Vec<Record>>;
        async fn get_by_id(&self, collection: &str, id: RecordId, fields: &[String]) -> Result<Option<Record>>;
        async fn create(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome>;
        async fn update(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome>;
        async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<MutationOutcome>;
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
