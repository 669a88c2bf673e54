use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use super::{Clock, SessionId, SessionRecord, SessionStore, SystemClock};
use crate::{Result, UserId};

/// Decides whether a session record is still valid.
///
/// A zero or negative duration means sessions never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirationPolicy {
    duration: Duration,
}

impl ExpirationPolicy {
    /// A policy under which sessions live for `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// A policy under which sessions live for `seconds`; zero means forever.
    pub fn from_secs(seconds: u64) -> Self {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        Self::new(Duration::seconds(seconds))
    }

    /// A policy under which sessions never expire.
    pub fn never() -> Self {
        Self::default()
    }

    /// Returns the session lifetime, or `None` if sessions never expire.
    pub fn duration(&self) -> Option<Duration> {
        self.duration.is_positive().then_some(self.duration)
    }

    /// Returns when `record` expires, or `None` if it never does.
    pub fn expires_at(&self, record: &SessionRecord) -> Option<OffsetDateTime> {
        let duration = self.duration()?;
        // Saturate rather than overflow for absurdly long durations.
        Some(
            record
                .created_at
                .checked_add(duration)
                .unwrap_or(PrimitiveDateTime::MAX.assume_utc()),
        )
    }

    /// Returns `true` while `now` is before the record's expiry.
    pub fn is_valid(&self, record: &SessionRecord, now: OffsetDateTime) -> bool {
        match self.expires_at(record) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Wraps a store so expired records are never returned.
///
/// Expiry is discovered lazily: a record found past its lifetime is evicted
/// from the wrapped store on that access. There is no background sweep, so
/// abandoned sessions stay in memory until someone presents them again.
#[derive(Debug, Clone)]
pub struct Expiring<S> {
    inner: S,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> Expiring<S> {
    /// Wraps `inner`, judging records against the system clock.
    pub fn new(inner: S, policy: ExpirationPolicy) -> Self {
        Self {
            inner,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Judges records against the given clock instead.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the policy in force.
    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for Expiring<S> {
    async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>> {
        self.inner.create(user_id).await
    }

    async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        let Some(record) = self.inner.lookup(session_id).await? else {
            return Ok(None);
        };

        if self.policy.is_valid(&record, self.clock.now()) {
            return Ok(Some(record));
        }

        tracing::debug!(user.id = %record.user_id, "evicting expired session");
        self.inner.destroy(session_id).await?;

        Ok(None)
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<bool> {
        self.inner.destroy(session_id).await
    }

    async fn destroy_for_user(&self, user_id: &UserId) -> Result<usize> {
        self.inner.destroy_for_user(user_id).await
    }

    async fn restore(&self, record: SessionRecord) -> Result<()> {
        self.inner.restore(record).await
    }
}
