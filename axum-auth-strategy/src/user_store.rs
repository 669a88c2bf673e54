use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An opaque, stable identifier of a user.
///
/// The strategies never interpret the value; they only store it alongside a
/// session and hand it back to [`UserStore::get_user`]. An empty id is never
/// valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the identifier is empty or only whitespace.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// A user which can be identified and authenticated with a password.
///
/// # Examples
///
/// ```rust
/// use axum_auth_strategy::{AuthUser, UserId};
///
/// #[derive(Debug, Clone)]
/// struct User {
///     id: i64,
///     email: String,
///     password_hash: String,
/// }
///
/// impl AuthUser for User {
///     fn id(&self) -> UserId {
///         UserId::new(self.id.to_string())
///     }
///
///     fn email(&self) -> &str {
///         &self.email
///     }
///
///     fn password_hash(&self) -> &str {
///         &self.password_hash
///     }
/// }
/// ```
pub trait AuthUser: Debug + Clone + Send + Sync + 'static {
    /// Returns the identifying feature of the user.
    fn id(&self) -> UserId;

    /// Returns the email address the user logs in with.
    fn email(&self) -> &str;

    /// Returns the stored password digest, as produced by a
    /// [`PasswordHasher`](crate::PasswordHasher).
    fn password_hash(&self) -> &str;
}

/// A trait which defines how users are retrieved from an arbitrary backend.
///
/// This is where the user table lives: a database, a cache or, for tests, a
/// [`MemoryUserStore`](crate::memory_store::MemoryUserStore). Errors returned
/// here are treated as "no user" by the strategies and logged.
#[async_trait]
pub trait UserStore: Clone + Send + Sync + 'static {
    /// An associated user type which will be loaded from the store.
    type User: AuthUser;

    /// An error which can occur while querying the store.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns every user registered with the given email address.
    ///
    /// Candidates are checked against the presented password in order.
    async fn find_by_email(&self, email: &str) -> Result<Vec<Self::User>, Self::Error>;

    /// Loads a user by id.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<Self::User>, Self::Error>;
}
