//! Auth types shared across Blackout services.
//!
//! The gateway validates sessions and forwards the caller's identity as headers;
//! services only read them through [`identity::IdentityHeaders`].

pub mod identity;
