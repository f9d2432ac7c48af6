//! ACP observatory control HTTP client
//!
//! The ACP web server speaks a form-encoded ASP surface rather than a JSON
//! API: plans are submitted as 16-slot filter forms and status comes back
//! as percent-encoded JavaScript assignments. This crate wraps that surface
//! behind a typed async client with explicit transient-vs-fatal error
//! classification.

pub mod client;
pub mod plan;
pub mod status;

pub use client::{AcpClient, AcpError, Credentials, TimeoutConfig};
pub use plan::{AcpImagingPlan, FilterSlot};
pub use status::ObservatoryStatus;
