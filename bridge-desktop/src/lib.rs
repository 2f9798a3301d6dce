//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for server and desktop hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with per-request timeouts
//! - `JobScheduler` using the Tokio runtime, with soft/hard run limits
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioJobScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let scheduler = TokioJobScheduler::new();
//!     scheduler.register_job("sync", |budget| async move { Ok(()) }).await;
//!     Ok(())
//! }
//! ```

mod http;
mod scheduler;

pub use http::ReqwestHttpClient;
pub use scheduler::TokioJobScheduler;
