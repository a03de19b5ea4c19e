//! Workspace umbrella crate.
//!
//! Exposes the `desktop-shims` feature that maps onto `core-service`, so host
//! applications can depend on `vibestream-workspace` and get the service façade,
//! the reqwest-backed HTTP client and the remote store connector in one line.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
