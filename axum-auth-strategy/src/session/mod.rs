//! Session records and the stores which hold them.
//!
//! A store maps a [`SessionId`] to a [`SessionRecord`]. Behavior is layered
//! by wrapping: [`Expiring`] hides and lazily evicts records older than a
//! configured duration, and [`Persisted`] mirrors creations and deletions to
//! a [`PersistenceBackend`](crate::persistence::PersistenceBackend). Each
//! layer implements [`SessionStore`] itself, so any stack of them can back a
//! [`SessionAuth`](crate::SessionAuth) strategy.
//!
//! [`ResetTokens`] reuses the same machinery for single-use password reset
//! tokens.

use std::{
    fmt::{self, Debug},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub use self::{
    expiry::{ExpirationPolicy, Expiring},
    memory::MemorySessionStore,
    persisted::Persisted,
    reset::{PasswordReset, ResetTokens},
};
use crate::{Error, Result, UserId};

mod expiry;
mod memory;
mod persisted;
mod reset;

const SESSION_ID_BYTES: usize = 32;

/// An opaque, unguessable session token.
///
/// Minted from 256 bits of OS randomness and encoded as unpadded URL-safe
/// base64, so it can travel in a cookie as is.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh token.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| Error::Entropy)?;

        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Returns the token as presented by clients.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are bearer credentials: only a short prefix is ever formatted.
impl Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionId({prefix}…)")
    }
}

impl From<String> for SessionId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionId {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// A live session: who it belongs to and when it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The token identifying the session.
    pub session_id: SessionId,

    /// The user the session was created for.
    pub user_id: UserId,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SessionRecord {
    /// Mints a record with a fresh token.
    pub fn new(user_id: UserId, created_at: OffsetDateTime) -> Result<Self> {
        Ok(Self {
            session_id: SessionId::generate()?,
            user_id,
            created_at,
        })
    }
}

/// A source of wall-clock time.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;
}

/// The system clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock which only moves when told to; handy for exercising expiry.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<OffsetDateTime>>,
}

impl ManualClock {
    /// Creates a clock stopped at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Moves the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(OffsetDateTime::now_utc())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A mapping from session id to session record.
///
/// Every operation is atomic with respect to concurrent callers. Errors are
/// reserved for infrastructure failures; an unknown session is `Ok(None)`.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync + 'static {
    /// Creates a session for `user_id`, returning its record.
    ///
    /// Returns `Ok(None)` when `user_id` is empty.
    async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>>;

    /// Returns the live record for `session_id`, if any.
    async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Removes the record for `session_id`, returning whether one existed.
    async fn destroy(&self, session_id: &SessionId) -> Result<bool>;

    /// Removes every record belonging to `user_id`, returning how many
    /// sessions were ended.
    async fn destroy_for_user(&self, user_id: &UserId) -> Result<usize>;

    /// Inserts an already minted record, e.g. one reloaded from persistence.
    ///
    /// A record already held under the same id is kept.
    async fn restore(&self, record: SessionRecord) -> Result<()>;

    /// Returns the user a live session belongs to.
    async fn user_id_for_session(&self, session_id: &SessionId) -> Result<Option<UserId>> {
        Ok(self.lookup(session_id).await?.map(|record| record.user_id))
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for Arc<S> {
    async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>> {
        (**self).create(user_id).await
    }

    async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        (**self).lookup(session_id).await
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<bool> {
        (**self).destroy(session_id).await
    }

    async fn destroy_for_user(&self, user_id: &UserId) -> Result<usize> {
        (**self).destroy_for_user(user_id).await
    }

    async fn restore(&self, record: SessionRecord) -> Result<()> {
        (**self).restore(record).await
    }

    async fn user_id_for_session(&self, session_id: &SessionId) -> Result<Option<UserId>> {
        (**self).user_id_for_session(session_id).await
    }
}
