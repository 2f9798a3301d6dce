//! # Host Bridge Traits
//!
//! Capability traits the sync core depends on, implemented per host.
//!
//! ## Overview
//!
//! The core never talks to the network, the scheduler or the host logger
//! directly. It goes through the traits defined here so that tests can
//! substitute mocks and hosts can substitute their own adapters.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry and per-request timeouts
//! - [`CatalogClient`](catalog::CatalogClient) - Remote build catalog (apps, builds, symbol URLs)
//! - [`CatalogClientFactory`](catalog::CatalogClientFactory) - Builds catalog clients from project credentials
//!
//! ### Scheduling
//! - [`JobScheduler`](background::JobScheduler) - Named recurring jobs with soft/hard limits
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Capability | Crate |
//! |------------|-------|
//! | `HttpClient`, `JobScheduler` | `bridge-desktop` |
//! | `CatalogClient`, `CatalogClientFactory` | `provider-itunes-connect` |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should keep transport failures (`Timeout`, `Status`, `OperationFailed`)
//! distinct from unusable configuration (`NotAvailable`) so the core can
//! decide between retrying and skipping.

pub mod background;
pub mod catalog;
pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use background::{JobId, JobLimits, JobScheduler, JobSpec, JobStatus, RunBudget};
pub use catalog::{
    CatalogApplication, CatalogBuild, CatalogClient, CatalogClientFactory, CatalogCredentials,
};
pub use http::{FetchOptions, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
