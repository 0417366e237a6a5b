//! Session sequencing, revocation and lockout for credentials.
//!
//! This crate owns the per-credential [`Counter`]s from `compandauth-model`
//! and applies the configured [`ValidationPolicy`] when sessions are
//! presented back. Storage of the counter values stays with the caller: every
//! mutating call returns the counter to persist.
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod registry;

pub use compandauth_model::{
    Counter, CounterError, CredentialId, SessionCaa, Validity,
};
pub use config::{PolicySource, ValidationPolicy};
pub use error::{CoreError, CoreResult};
pub use registry::{CounterRegistry, IssuedSession};
