//! Per-credential counter ownership.
//!
//! [`CounterRegistry`] is the session-management side of the counter: it keeps
//! one [`Counter`] per credential and funnels every read-modify-write of that
//! counter through the map entry's exclusive guard. Two logins racing on the
//! same credential therefore receive distinct, consecutive sequence numbers,
//! while unrelated credentials never wait on each other.
//!
//! Every mutation hands back the resulting counter so the caller can persist
//! exactly the value that was produced. Failed operations leave the stored
//! counter untouched.

use compandauth_model::{
    Counter, CounterError, CredentialId, SessionCaa, Validity,
};
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info, instrument, warn};

use crate::config::ValidationPolicy;
use crate::error::{CoreError, CoreResult};

/// A freshly minted session together with the counter value to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedSession {
    /// Sequence number to embed in the session token.
    pub session: SessionCaa,
    /// Counter state after issuing.
    pub counter: Counter,
}

/// In-memory owner of credential counters.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<CredentialId, Counter>,
    policy: ValidationPolicy,
}

impl CounterRegistry {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            counters: DashMap::new(),
            policy,
        }
    }

    pub fn with_default_policy() -> Self {
        Self::default()
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn contains(&self, credential: CredentialId) -> bool {
        self.counters.contains_key(&credential)
    }

    /// Start tracking a new credential with a fresh counter.
    #[instrument(skip(self), level = "debug")]
    pub fn register(&self, credential: CredentialId) -> CoreResult<Counter> {
        match self.counters.entry(credential) {
            Entry::Occupied(_) => Err(CoreError::AlreadyRegistered(credential)),
            Entry::Vacant(slot) => {
                let counter = Counter::new();
                slot.insert(counter);
                debug!("registered credential counter");
                Ok(counter)
            }
        }
    }

    /// Load a persisted counter value, replacing any tracked state.
    #[instrument(skip(self), level = "debug")]
    pub fn restore(
        &self,
        credential: CredentialId,
        raw: i64,
    ) -> CoreResult<Counter> {
        let counter = Counter::from_raw(raw)
            .map_err(|source| CoreError::Counter { credential, source })?;

        if let Some(previous) = self.counters.insert(credential, counter) {
            debug!(%previous, %counter, "replaced tracked counter");
        }
        Ok(counter)
    }

    pub fn snapshot(&self, credential: CredentialId) -> CoreResult<Counter> {
        self.counters
            .get(&credential)
            .map(|entry| *entry)
            .ok_or(CoreError::UnknownCredential(credential))
    }

    /// Stop tracking a credential, returning its final counter.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self, credential: CredentialId) -> CoreResult<Counter> {
        self.counters
            .remove(&credential)
            .map(|(_, counter)| counter)
            .ok_or(CoreError::UnknownCredential(credential))
    }

    pub fn is_locked(&self, credential: CredentialId) -> CoreResult<bool> {
        self.snapshot(credential).map(|counter| counter.is_locked())
    }

    /// Mark a credential compromised. Sessions stop validating until
    /// [`CounterRegistry::unlock`].
    #[instrument(skip(self), level = "debug")]
    pub fn lock(&self, credential: CredentialId) -> CoreResult<Counter> {
        let ((), counter) = self.update(credential, |counter| {
            if !counter.is_issued() {
                warn!(
                    "locking a credential that never issued a session; \
                     the lock is not observable"
                );
            }
            counter.lock();
            Ok(())
        })?;

        info!(%counter, "credential locked");
        Ok(counter)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn unlock(&self, credential: CredentialId) -> CoreResult<Counter> {
        let ((), counter) = self.update(credential, |counter| {
            counter.unlock();
            Ok(())
        })?;

        info!(%counter, "credential unlocked");
        Ok(counter)
    }

    /// Mint the next session for a credential.
    #[instrument(skip(self), level = "debug")]
    pub fn issue(
        &self,
        credential: CredentialId,
    ) -> CoreResult<IssuedSession> {
        let (session, counter) = self.update(credential, Counter::issue)?;

        if counter.is_locked() {
            info!(%session, "issued session for locked credential");
        } else {
            debug!(%session, %counter, "issued session");
        }
        Ok(IssuedSession { session, counter })
    }

    /// Advance a credential's counter by `n` revocations.
    #[instrument(skip(self), level = "debug")]
    pub fn revoke(
        &self,
        credential: CredentialId,
        n: i64,
    ) -> CoreResult<Counter> {
        let ((), counter) =
            self.update(credential, |counter| counter.revoke(n))?;

        debug!(%counter, "revoked sessions");
        Ok(counter)
    }

    /// Revoke enough to reject every session issued so far under the
    /// registry's validation window.
    ///
    /// When the counter has no room left for the revocation the credential is
    /// locked instead, so the outstanding sessions are still rejected, and the
    /// `Exhausted` error is returned with the locked counter already stored.
    #[instrument(skip(self), level = "debug")]
    pub fn revoke_outstanding(
        &self,
        credential: CredentialId,
    ) -> CoreResult<Counter> {
        let window = self.policy.window;
        let (exhausted, counter) = self.update(credential, |counter| {
            match counter.revoke(window) {
                Ok(()) => Ok(None),
                Err(err @ CounterError::Exhausted { .. }) => {
                    counter.lock();
                    Ok(Some(err))
                }
                Err(err) => Err(err),
            }
        })?;

        if let Some(source) = exhausted {
            warn!(%counter, "counter exhausted; locked credential instead");
            return Err(CoreError::Counter { credential, source });
        }

        debug!(%counter, "revoked outstanding sessions");
        Ok(counter)
    }

    /// Check a presented session against the credential's counter using the
    /// policy window as slack.
    #[instrument(skip(self), level = "debug")]
    pub fn validate(
        &self,
        credential: CredentialId,
        session: SessionCaa,
    ) -> CoreResult<Counter> {
        let counter = self.snapshot(credential)?;

        match counter.validate(session, self.policy.window) {
            Validity::Valid => Ok(counter),
            reason => {
                debug!(%counter, %reason, "session rejected");
                Err(CoreError::Rejected { credential, reason })
            }
        }
    }

    /// Boolean form of [`CounterRegistry::validate`]. Unknown credentials
    /// accept nothing.
    pub fn is_valid(
        &self,
        credential: CredentialId,
        session: SessionCaa,
    ) -> bool {
        self.validate(credential, session).is_ok()
    }

    /// Apply `op` to a copy of the counter while holding the entry's write
    /// guard and commit only on success.
    fn update<T>(
        &self,
        credential: CredentialId,
        op: impl FnOnce(&mut Counter) -> Result<T, CounterError>,
    ) -> CoreResult<(T, Counter)> {
        let mut entry = self
            .counters
            .get_mut(&credential)
            .ok_or(CoreError::UnknownCredential(credential))?;

        let mut next = *entry;
        let output = op(&mut next)
            .map_err(|source| CoreError::Counter { credential, source })?;
        *entry = next;

        Ok((output, next))
    }
}
