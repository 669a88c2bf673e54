use super::{Clock, ExpirationPolicy, Expiring, MemorySessionStore, SessionId, SessionStore};
use crate::{AuthUser, PasswordHasher, Result, UserId, UserStore};

/// Single-use password reset tokens.
///
/// Tokens are minted like session ids and held in an [`Expiring`] in-memory
/// store. Issuing a token revokes any earlier one for the same user, and a
/// token can be consumed exactly once, even under concurrent attempts.
#[derive(Debug, Clone)]
pub struct ResetTokens<S = Expiring<MemorySessionStore>> {
    tokens: S,
}

impl ResetTokens {
    /// Creates an empty token store whose tokens live as long as `policy`
    /// allows.
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self::over(Expiring::new(MemorySessionStore::new(), policy))
    }

    /// Like [`ResetTokens::new`] but stamping and judging tokens with `clock`.
    pub fn with_clock(policy: ExpirationPolicy, clock: impl Clock + Clone) -> Self {
        let memory = MemorySessionStore::new().with_clock(clock.clone());
        Self::over(Expiring::new(memory, policy).with_clock(clock))
    }
}

impl<S: SessionStore> ResetTokens<S> {
    /// Keeps tokens in `tokens` instead, e.g. a [`Persisted`](super::Persisted)
    /// stack.
    pub fn over(tokens: S) -> Self {
        Self { tokens }
    }

    /// Issues a token for `user_id`, revoking any previous one.
    ///
    /// Returns `Ok(None)` when `user_id` is empty.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn issue(&self, user_id: &UserId) -> Result<Option<SessionId>> {
        if user_id.is_empty() {
            return Ok(None);
        }

        self.tokens.destroy_for_user(user_id).await?;
        let record = self.tokens.create(user_id).await?;

        Ok(record.map(|record| record.session_id))
    }

    /// Issues a token for the first user registered under `email`.
    ///
    /// An unknown email, or a user store failure, yields `Ok(None)`.
    pub async fn issue_for_email<Users: UserStore>(
        &self,
        users: &Users,
        email: &str,
    ) -> Result<Option<SessionId>> {
        let candidates = match users.find_by_email(email).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(err = %err, "could not look up user for password reset");
                return Ok(None);
            }
        };

        match candidates.first() {
            Some(user) => self.issue(&user.id()).await,
            None => Ok(None),
        }
    }

    /// Consumes `token`, returning the user it was issued for.
    ///
    /// Unknown, expired and already consumed tokens yield `Ok(None)`.
    pub async fn consume(&self, token: &SessionId) -> Result<Option<UserId>> {
        let Some(record) = self.tokens.lookup(token).await? else {
            return Ok(None);
        };

        // Only one concurrent caller gets to remove the record.
        if !self.tokens.destroy(token).await? {
            return Ok(None);
        }

        Ok(Some(record.user_id))
    }

    /// Consumes `token` and hashes `new_password`, leaving the caller to
    /// store the digest for the returned user.
    pub async fn redeem<H: PasswordHasher>(
        &self,
        token: &SessionId,
        new_password: &str,
        hasher: &H,
    ) -> Result<Option<PasswordReset>> {
        let Some(user_id) = self.consume(token).await? else {
            return Ok(None);
        };

        Ok(Some(PasswordReset {
            user_id,
            password_hash: hasher.hash(new_password)?,
        }))
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.tokens
    }
}

/// A redeemed reset token.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordReset {
    /// The user whose password is being reset.
    pub user_id: UserId,

    /// The digest of the new password.
    pub password_hash: String,
}

impl std::fmt::Debug for PasswordReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordReset")
            .field("user_id", &self.user_id)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}
