//! Signed issuance/lock counter.
//!
//! A credential's whole session state lives in a single `i64`:
//!
//! - the sign carries the lock flag (`v < 0` means the credential is locked
//!   after suspected compromise),
//! - the magnitude counts sessions issued so far, advanced further by
//!   revocations.
//!
//! Lock and unlock only flip the sign. Issue and revoke only grow the
//! magnitude, in whichever direction the sign currently points. The persisted
//! form is the raw integer, so values written by earlier deployments load
//! unchanged through [`Counter::from_raw`].
//!
//! Locking a counter that has never issued leaves it at `0`, which still
//! reports unlocked. Nothing was ever handed out under such a credential, so
//! [`Counter::is_valid`] rejects every session for it regardless.

use std::fmt;

use crate::error::{CounterError, Result};

/// Sequence number handed out by [`Counter::issue`] and embedded in a session
/// token. Presented back later to [`Counter::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SessionCaa(i64);

impl SessionCaa {
    /// Wrap a sequence number read back from a session token.
    pub const fn new(value: i64) -> Self {
        SessionCaa(value)
    }

    /// Raw sequence number to embed in a token.
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SessionCaa {
    fn from(value: i64) -> Self {
        SessionCaa(value)
    }
}

impl From<SessionCaa> for i64 {
    fn from(session: SessionCaa) -> Self {
        session.0
    }
}

impl fmt::Display for SessionCaa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of checking a session against a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Validity {
    /// The session is accepted.
    Valid,
    /// The credential is locked; no session is accepted.
    Locked,
    /// Nothing has ever been issued for the credential.
    NeverIssued,
    /// Issuances or revocations since this session exceed the allowed slack.
    Superseded,
}

impl Validity {
    /// Whether the session is accepted.
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    /// Stable snake_case label, matching the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Locked => "locked",
            Self::NeverIssued => "never_issued",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-credential issuance counter with the lock flag folded into its sign.
///
/// The type holds no synchronization. Owners must serialize every
/// read-modify-write of one credential's counter; a lost update reuses or
/// skips a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
pub struct Counter(i64);

impl Counter {
    /// Fresh counter: unlocked, nothing issued.
    pub const fn new() -> Self {
        Counter(0)
    }

    /// Rebuild a counter from its persisted integer.
    pub fn from_raw(value: i64) -> Result<Self> {
        if value == i64::MIN {
            return Err(CounterError::OutOfRange(value));
        }
        Ok(Counter(value))
    }

    /// Raw integer to persist after every mutation.
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Number of sessions issued plus revocation advances.
    pub const fn magnitude(&self) -> i64 {
        // `from_raw` excludes i64::MIN, so this never saturates in practice.
        self.0.saturating_abs()
    }

    /// Whether any session was ever issued under this counter.
    pub const fn is_issued(&self) -> bool {
        self.0 != 0
    }

    pub const fn is_locked(&self) -> bool {
        self.0 < 0
    }

    /// Mark the credential compromised. Magnitude is untouched.
    pub fn lock(&mut self) {
        if !self.is_locked() {
            self.0 = -self.0;
        }
    }

    pub fn unlock(&mut self) {
        if self.is_locked() {
            self.0 = -self.0;
        }
    }

    /// Mint the next session sequence number.
    ///
    /// Returns the magnitude before the call and grows it by one, keeping the
    /// lock state. Issuing while locked still advances the sequence; those
    /// sessions simply never validate until the counter is unlocked.
    pub fn issue(&mut self) -> Result<SessionCaa> {
        let issued = self.magnitude();
        self.advance(1)?;
        Ok(SessionCaa(issued))
    }

    /// Advance the magnitude by `n` without minting a session, invalidating
    /// the `n` most recent issuances for any fixed slack.
    ///
    /// A counter that never issued stays at zero.
    pub fn revoke(&mut self, n: i64) -> Result<()> {
        if n < 0 {
            return Err(CounterError::NegativeRevocation(n));
        }
        if !self.is_issued() {
            return Ok(());
        }
        self.advance(n)
    }

    /// Whether `session` is still accepted given `delta` slack.
    pub fn is_valid(&self, session: SessionCaa, delta: i64) -> bool {
        self.validate(session, delta).is_valid()
    }

    /// Same check as [`Counter::is_valid`], reporting why a session fails.
    pub fn validate(&self, session: SessionCaa, delta: i64) -> Validity {
        if self.is_locked() {
            return Validity::Locked;
        }
        if !self.is_issued() {
            return Validity::NeverIssued;
        }

        // Saturation keeps the comparison exact: an overflowing sum exceeds
        // every counter value, an underflowing one is below all of them.
        if session.0.saturating_add(delta) >= self.0 {
            Validity::Valid
        } else {
            Validity::Superseded
        }
    }

    fn advance(&mut self, n: i64) -> Result<()> {
        let magnitude = self.magnitude().checked_add(n).ok_or(
            CounterError::Exhausted {
                magnitude: self.magnitude(),
                requested: n,
            },
        )?;

        self.0 = if self.is_locked() { -magnitude } else { magnitude };
        Ok(())
    }
}

impl TryFrom<i64> for Counter {
    type Error = CounterError;

    fn try_from(value: i64) -> Result<Self> {
        Counter::from_raw(value)
    }
}

impl From<Counter> for i64 {
    fn from(counter: Counter) -> Self {
        counter.0
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
