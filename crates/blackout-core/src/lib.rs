//! Cross-cutting service plumbing: tracing setup, health checks, request ids,
//! and shared serde helpers.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
