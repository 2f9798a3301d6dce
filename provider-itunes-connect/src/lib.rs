//! # iTunes Connect Provider
//!
//! Implements `CatalogClient` for the iTunes Connect build catalog.
//!
//! ## Overview
//!
//! This module provides:
//! - Bearer-token authentication, optionally scoped to a team
//! - Paginated application and build listings
//! - Resolution of a build's dSYM download URL
//! - A `CatalogClientFactory` that builds one client per project credentials

pub mod client;
pub mod error;
pub mod types;

pub use client::{ItunesConnectClient, ItunesConnectClientFactory};
pub use error::{ItunesConnectError, Result};
