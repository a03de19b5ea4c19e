//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the VibeStream core:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions and the validated configuration
//! consumed by the consistency layer and the service façade.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
