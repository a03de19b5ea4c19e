//! # Remote Record Store Provider
//!
//! Implements `StoreGateway` over HTTP for a hosted record store.
//!
//! ## Overview
//!
//! This crate provides:
//! - JSON wire types for the store's fetch / get / create / update / delete endpoints
//! - `RemoteStoreConnector`, which maps `FetchQuery` and batch mutations onto them
//! - Read retries through the injected `HttpClient`; mutations are sent once

pub mod connector;
pub mod error;
pub mod types;

pub use connector::RemoteStoreConnector;
pub use error::{RemoteStoreError, Result};
