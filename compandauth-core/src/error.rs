use compandauth_model::{CounterError, CredentialId, Validity};
use thiserror::Error;

/// Errors surfaced by the session-management layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("No counter registered for credential {0}")]
    UnknownCredential(CredentialId),

    #[error("Credential {0} already has a counter")]
    AlreadyRegistered(CredentialId),

    #[error("Counter update rejected for credential {credential}: {source}")]
    Counter {
        credential: CredentialId,
        #[source]
        source: CounterError,
    },

    #[error("Session rejected for credential {credential}: {reason}")]
    Rejected {
        credential: CredentialId,
        reason: Validity,
    },
}

impl CoreError {
    /// Validity verdict carried by a rejection, if this is one.
    pub fn rejection(&self) -> Option<Validity> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for registry operations
pub type CoreResult<T> = Result<T, CoreError>;
