//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the debug symbol sync service:
//! - Logging and tracing bootstrap
//! - Configuration builder with fail-fast validation
//!
//! ## Overview
//!
//! Every other workspace crate depends on the conventions established here:
//! structured `tracing` fields, credential redaction, and a single validated
//! [`SyncConfig`](config::SyncConfig) threaded through service construction.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result};
