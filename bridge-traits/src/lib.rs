//! # Host Bridge Traits
//!
//! Contracts between the consistency core and the outside world.
//!
//! ## Overview
//!
//! The core never talks to a concrete backend. Everything it needs is expressed
//! as a trait here and injected at construction time, so a fake can be swapped
//! in for tests:
//!
//! - [`StoreGateway`](store::StoreGateway) - generic remote record store
//!   (fetch / get-by-id / create / update / delete, no transactions)
//! - [`HttpClient`](http::HttpClient) - async HTTP used by remote store connectors
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Connector
//! implementations should convert transport and decoding failures into it and
//! keep the store's own message when the store rejects a request.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so a single gateway can be
//! shared by every service behind an `Arc`.

pub mod error;
pub mod http;
pub mod store;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use store::{
    Condition, FetchQuery, MutationOutcome, Operator, Record, RecordId, RecordOutcome,
    SortDirection, StoreGateway,
};
