//! Test utilities for Blackout services.
//!
//! Import from `[dev-dependencies]` only.

pub mod auth;
