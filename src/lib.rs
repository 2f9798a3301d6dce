//! Debug-symbol catalog sync workspace.
//!
//! The real functionality lives in the workspace member crates; this root
//! crate re-exports the service façade for hosts that depend on the workspace
//! as a single package.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
