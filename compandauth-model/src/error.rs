use thiserror::Error;

/// Errors produced at the edges of the counter's domain.
///
/// Every operation that returns one of these leaves the counter exactly as it
/// was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Advancing the magnitude would exceed `i64::MAX`.
    #[error(
        "counter exhausted: magnitude {magnitude} cannot advance by {requested}"
    )]
    Exhausted { magnitude: i64, requested: i64 },

    #[error("revocation count must be non-negative, got {0}")]
    NegativeRevocation(i64),

    /// `i64::MIN` has no representable magnitude.
    #[error("value {0} is outside the counter domain")]
    OutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, CounterError>;
