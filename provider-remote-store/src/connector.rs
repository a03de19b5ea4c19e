//! Record store API connector implementation
//!
//! Implements the `StoreGateway` trait over the store's JSON endpoints.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::store::{
    FetchQuery, MutationOutcome, Record, RecordId, RecordOutcome, StoreGateway,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::RemoteStoreError;
use crate::types::{
    field_specs, DeleteRequest, FetchRequest, GetRequest, MutationResponse, ReadResponse,
    RecordsRequest,
};

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying a per-request correlation id
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Record store API connector
///
/// Implements `StoreGateway` on top of an injected `HttpClient`.
///
/// # Retries
///
/// Reads (`fetch`, `get_by_id`) are retried with the configured read policy.
/// Mutations are sent exactly once: a create that timed out may still have
/// been applied, and the layers above converge by re-reading instead.
///
/// # Example
///
/// ```ignore
/// use provider_remote_store::RemoteStoreConnector;
/// use bridge_traits::store::{FetchQuery, StoreGateway};
///
/// let connector = RemoteStoreConnector::new(http_client, "https://store.example.com/api")
///     .with_api_key("secret");
/// let genres = connector.fetch("genre_c", &FetchQuery::new(["name_c"])).await?;
/// ```
pub struct RemoteStoreConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Endpoint root, without trailing slash
    base_url: String,

    api_key: Option<String>,
    timeout: Duration,
    read_retry: RetryPolicy,
}

impl RemoteStoreConnector {
    /// Create a connector for the store rooted at `base_url`
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            read_retry: RetryPolicy::default(),
        }
    }

    /// Send `Authorization: Bearer <api_key>` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for reads
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/records/{}", self.base_url, action)
    }

    fn build_request<B: Serialize>(&self, action: &str, body: &B) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.endpoint(action))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(body)?;
        if let Some(api_key) = &self.api_key {
            request = request.bearer_token(api_key.as_str());
        }
        Ok(request)
    }

    /// POST `body` to `/records/{action}` and decode the JSON answer.
    async fn post<B, R>(&self, action: &str, body: &B, policy: RetryPolicy) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = self.build_request(action, body)?;
        let response = self.http_client.execute_with_retry(request, policy).await?;
        Self::decode(action, response)
    }

    fn decode<R: DeserializeOwned>(action: &str, response: HttpResponse) -> Result<R> {
        if !response.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "<non-UTF-8 body>".to_string());
            warn!(action, status = response.status, "Record store request failed");
            return Err(RemoteStoreError::ApiError {
                status_code: response.status,
                message,
            }
            .into());
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            RemoteStoreError::ParseError(format!("Failed to parse {} response: {}", action, e))
                .into()
        })
    }

    fn rejected(collection: &str, message: Option<String>) -> RemoteStoreError {
        RemoteStoreError::Rejected {
            collection: collection.to_string(),
            message: message.unwrap_or_else(|| "request failed".to_string()),
        }
    }

    /// Per-record outcomes for a batch of `expected` records.
    ///
    /// Without per-record results the top-level flag applies to every record:
    /// `success: false` rejects the whole batch. When results are present,
    /// records the store did not report on are marked failed.
    fn mutation_outcome(
        collection: &str,
        expected: usize,
        response: MutationResponse,
    ) -> Result<MutationOutcome> {
        let mut results = match response.results {
            Some(results) => results,
            None if response.success => (0..expected)
                .map(|_| RecordOutcome {
                    success: true,
                    ..RecordOutcome::default()
                })
                .collect(),
            None => return Err(Self::rejected(collection, response.message).into()),
        };

        if results.len() < expected {
            warn!(
                collection,
                expected,
                reported = results.len(),
                "Record store omitted per-record results"
            );
            results.resize_with(expected, || RecordOutcome::failed("no result reported"));
        }
        Ok(MutationOutcome::new(results))
    }

    async fn mutate(
        &self,
        action: &str,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<MutationOutcome> {
        let expected = records.len();
        let body = RecordsRequest {
            collection,
            records,
        };
        let response: MutationResponse = self.post(action, &body, RetryPolicy::none()).await?;
        Self::mutation_outcome(collection, expected, response)
    }
}

#[async_trait]
impl StoreGateway for RemoteStoreConnector {
    #[instrument(skip(self, query), fields(conditions = query.conditions.len()))]
    async fn fetch(&self, collection: &str, query: &FetchQuery) -> Result<Vec<Record>> {
        let body = FetchRequest::new(collection, query);
        let response: ReadResponse<Vec<Record>> =
            self.post("fetch", &body, self.read_retry.clone()).await?;

        if !response.success {
            return Err(Self::rejected(collection, response.message).into());
        }
        let records = response.data.unwrap_or_default();
        debug!(count = records.len(), "Fetched records");
        Ok(records)
    }

    #[instrument(skip(self, fields))]
    async fn get_by_id(
        &self,
        collection: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Option<Record>> {
        let body = GetRequest {
            collection,
            id,
            fields: field_specs(fields),
        };
        let response: ReadResponse<Record> =
            self.post("get", &body, self.read_retry.clone()).await?;

        if !response.success {
            return Err(Self::rejected(collection, response.message).into());
        }
        Ok(response.data)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn create(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome> {
        self.mutate("create", collection, records).await
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn update(&self, collection: &str, records: Vec<Record>) -> Result<MutationOutcome> {
        self.mutate("update", collection, records).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<MutationOutcome> {
        let body = DeleteRequest {
            collection,
            record_ids: ids,
        };
        let response: MutationResponse = self.post("delete", &body, RetryPolicy::none()).await?;
        Self::mutation_outcome(collection, ids.len(), response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::store::Condition;
    use bytes::Bytes;
    use mockall::mock;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> Result<HttpResponse>;
        }
    }

    fn respond(status: u16, body: Value) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn body_of(request: &HttpRequest) -> Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    fn connector(http: MockHttpClient) -> RemoteStoreConnector {
        RemoteStoreConnector::new(Arc::new(http), "https://store.test/api/")
    }

    #[tokio::test]
    async fn test_fetch_posts_query_with_read_retry() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .withf(|request, policy| {
                request.url == "https://store.test/api/records/fetch"
                    && request.method == HttpMethod::Post
                    && request.headers.contains_key(REQUEST_ID_HEADER)
                    && request.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer key-1")
                    && policy.max_attempts == 3
            })
            .returning(|request, _| {
                let body = body_of(&request);
                assert_eq!(body["collection"], json!("artist_follow_c"));
                assert_eq!(body["where"][0]["FieldName"], json!("user_id_c"));
                respond(
                    200,
                    json!({
                        "success": true,
                        "data": [{ "Id": 1, "artist_id_c": 5 }, { "Id": 2, "artist_id_c": 6 }]
                    }),
                )
            });

        let connector = connector(http).with_api_key("key-1");
        let query = FetchQuery::new(["artist_id_c"]).filter(Condition::equal_to("user_id_c", "u1"));
        let rows = connector.fetch("artist_follow_c", &query).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["artist_id_c"], json!(6));
    }

    #[tokio::test]
    async fn test_each_request_gets_fresh_request_id() {
        let mut http = MockHttpClient::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        http.expect_execute_with_retry()
            .times(2)
            .returning(move |request, _| {
                recorder
                    .lock()
                    .unwrap()
                    .push(request.headers[REQUEST_ID_HEADER].clone());
                respond(200, json!({ "success": true, "data": [] }))
            });

        let connector = connector(http);
        connector.fetch("genre_c", &FetchQuery::default()).await.unwrap();
        connector.fetch("genre_c", &FetchQuery::default()).await.unwrap();

        let ids = seen.lock().unwrap();
        assert_ne!(ids[0], ids[1]);
        assert!(Uuid::parse_str(&ids[0]).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_false_is_rejection() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| respond(200, json!({ "success": false, "message": "Unknown collection" })));

        let err = connector(http)
            .fetch("nope_c", &FetchQuery::default())
            .await
            .unwrap_err();

        match err {
            BridgeError::StoreRejected { collection, message } => {
                assert_eq!(collection, "nope_c");
                assert_eq!(message, "Unknown collection");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| respond(503, json!("maintenance")));

        let err = connector(http)
            .fetch("song_c", &FetchQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_get_by_id_missing_record() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|request, _| {
                let body = body_of(request);
                request.url.ends_with("/records/get")
                    && body["id"] == json!(42)
                    && body["fields"][0]["field"]["Name"] == json!("Id")
            })
            .returning(|_, _| respond(200, json!({ "success": true, "data": null })));

        let record = connector(http)
            .get_by_id("playlist_c", 42, &["name_c".to_string()])
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_sent_once() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .withf(|request, policy| {
                request.url.ends_with("/records/create") && policy.max_attempts == 1
            })
            .returning(|_, _| {
                respond(
                    200,
                    json!({
                        "success": true,
                        "results": [{ "success": true, "data": { "Id": 77, "song_id_c": 3 } }]
                    }),
                )
            });

        let mut row = Record::new();
        row.insert("song_id_c".to_string(), json!(3));
        let outcome = connector(http).create("song_like_c", vec![row]).await.unwrap();

        assert!(outcome.all_succeeded());
        assert_eq!(outcome.succeeded_ids(), vec![77]);
    }

    #[tokio::test]
    async fn test_partial_batch_keeps_per_record_results() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            respond(
                200,
                json!({
                    "success": false,
                    "results": [
                        { "success": true, "data": { "Id": 1 } },
                        { "success": false, "message": "already exists", "code": "DUPLICATE_RECORD" }
                    ]
                }),
            )
        });

        let outcome = connector(http)
            .create("artist_follow_c", vec![Record::new(), Record::new(), Record::new()])
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results[0].success);
        assert!(outcome.results[1].is_duplicate());
        assert_eq!(
            outcome.results[2].message.as_deref(),
            Some("no result reported")
        );
    }

    #[tokio::test]
    async fn test_whole_batch_rejection() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| respond(200, json!({ "success": false, "message": "Invalid field" })));

        let err = connector(http)
            .update("playlist_c", vec![Record::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::StoreRejected { .. }));
    }

    #[tokio::test]
    async fn test_delete_sends_record_ids_once() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .withf(|request, policy| {
                body_of(request)["RecordIds"] == json!([4, 5]) && policy.max_attempts == 1
            })
            .returning(|_, _| {
                respond(
                    200,
                    json!({ "success": true, "results": [{ "success": true }, { "success": true }] }),
                )
            });

        let outcome = connector(http).delete("playlist_song_c", &[4, 5]).await.unwrap();
        assert!(outcome.all_succeeded());
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn test_bare_success_applies_to_every_record() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| respond(200, json!({ "success": true })));

        let outcome = connector(http).delete("song_like_c", &[8, 9]).await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.all_succeeded());
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let err = connector(http).delete("song_c", &[1]).await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(ref m) if m == "connection reset"));
    }
}
