//! Session issuance counter shared by compandauth crates.
//!
//! [`Counter`] folds a credential's lock flag and its session issuance count
//! into one signed integer. It holds no IO and no synchronization; callers
//! persist [`Counter::value`] after each mutation and serialize access per
//! credential.
#![allow(missing_docs)]

pub mod counter;
pub mod error;
pub mod ids;

pub use counter::{Counter, SessionCaa, Validity};
pub use error::{CounterError, Result as CounterResult};
pub use ids::CredentialId;
