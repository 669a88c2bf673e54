use std::{fmt, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap,
};
use time::Duration;
use tower_cookies::cookie::{Cookie, SameSite};

use crate::{
    basic::{self, Credentials},
    persistence::PersistenceBackend,
    session::{ExpirationPolicy, Expiring, MemorySessionStore, Persisted, SessionId, SessionStore},
    user_store::UserStore,
    Argon2Hasher, AuthUser, ExclusionList, PasswordHasher, Result, UserId,
};

/// What the request pipeline should do about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<User> {
    /// The path is excluded from authentication.
    NotRequired,

    /// The request carries neither an `Authorization` header nor a session
    /// cookie.
    Missing,

    /// The request carries credentials which don't resolve to a user.
    Rejected,

    /// The request is authenticated as this user.
    Authenticated(User),
}

/// A way of deciding which user, if any, a request represents.
///
/// Only [`current_user`](Self::current_user) is required; everything else has
/// a default suited to strategies without sessions. Routine failures such as
/// malformed headers, wrong passwords or unknown sessions are `Ok(None)`.
/// Only infrastructure failures are errors.
#[async_trait]
pub trait AuthStrategy: Send + Sync + 'static {
    /// The user type requests resolve to.
    type User: AuthUser;

    /// Returns `true` unless `path` matches one of `exclusions`.
    fn require_auth(&self, path: Option<&str>, exclusions: &ExclusionList) -> bool {
        exclusions.requires_auth(path)
    }

    /// Returns the raw `Authorization` header value.
    fn authorization_header<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        headers.get(AUTHORIZATION)?.to_str().ok()
    }

    /// Returns the session token presented by the request.
    fn session_cookie(&self, _headers: &HeaderMap) -> Option<String> {
        None
    }

    /// Resolves the user the request represents.
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<Self::User>>;

    /// Starts a session for `user_id`.
    async fn create_session(&self, _user_id: &UserId) -> Result<Option<SessionId>> {
        Ok(None)
    }

    /// Ends the session the request presents, returning whether one existed.
    async fn destroy_session(&self, _headers: &HeaderMap) -> Result<bool> {
        Ok(false)
    }

    /// Ends every session belonging to `user_id`, returning how many there
    /// were.
    async fn destroy_sessions_for_user(&self, _user_id: &UserId) -> Result<usize> {
        Ok(0)
    }

    /// Checks an email and password pair against the user store.
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Option<Self::User>> {
        Ok(None)
    }

    /// Authenticates with an email and password and starts a session.
    ///
    /// Returns `None` if the credentials don't match or the strategy has no
    /// sessions.
    async fn login(&self, email: &str, password: &str) -> Result<Option<(Self::User, SessionId)>> {
        let credentials = Credentials::new(email, password);
        let Some(user) = self.authenticate(&credentials).await? else {
            return Ok(None);
        };
        let Some(session_id) = self.create_session(&user.id()).await? else {
            return Ok(None);
        };

        Ok(Some((user, session_id)))
    }

    /// Builds the cookie which hands `session_id` to the client.
    fn session_cookie_for(&self, _session_id: &SessionId) -> Option<Cookie<'static>> {
        None
    }

    /// Builds the cookie which clears the session cookie on the client.
    fn removal_cookie(&self) -> Option<Cookie<'static>> {
        None
    }

    /// Runs the whole pipeline for one request.
    async fn resolve(
        &self,
        path: Option<&str>,
        headers: &HeaderMap,
        exclusions: &ExclusionList,
    ) -> Result<Outcome<Self::User>> {
        if !self.require_auth(path, exclusions) {
            return Ok(Outcome::NotRequired);
        }

        if self.authorization_header(headers).is_none() && self.session_cookie(headers).is_none() {
            return Ok(Outcome::Missing);
        }

        Ok(match self.current_user(headers).await? {
            Some(user) => Outcome::Authenticated(user),
            None => Outcome::Rejected,
        })
    }
}

/// A shared, type-erased strategy, as selected at runtime by
/// [`AuthConfig`](crate::AuthConfig).
pub type DynStrategy<User> = Arc<dyn AuthStrategy<User = User>>;

/// A strategy which never authenticates anyone.
pub struct NoAuth<User> {
    _user: PhantomData<fn() -> User>,
}

impl<User> NoAuth<User> {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self { _user: PhantomData }
    }
}

impl<User> Default for NoAuth<User> {
    fn default() -> Self {
        Self::new()
    }
}

impl<User> Clone for NoAuth<User> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<User> fmt::Debug for NoAuth<User> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoAuth")
    }
}

#[async_trait]
impl<User: AuthUser> AuthStrategy for NoAuth<User> {
    type User = User;

    async fn current_user(&self, _headers: &HeaderMap) -> Result<Option<User>> {
        Ok(None)
    }
}

/// Authenticates every request from its `Authorization: Basic` header.
#[derive(Clone)]
pub struct BasicAuth<Users, H = Argon2Hasher> {
    users: Users,
    hasher: H,
}

impl<Users: UserStore> BasicAuth<Users> {
    /// Creates the strategy over `users` with the default hasher.
    pub fn new(users: Users) -> Self {
        Self {
            users,
            hasher: Argon2Hasher::default(),
        }
    }
}

impl<Users, H> BasicAuth<Users, H> {
    /// Verifies passwords with `hasher` instead.
    pub fn with_hasher<H2: PasswordHasher>(self, hasher: H2) -> BasicAuth<Users, H2> {
        BasicAuth {
            users: self.users,
            hasher,
        }
    }
}

impl<Users, H: fmt::Debug> fmt::Debug for BasicAuth<Users, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<Users: UserStore, H: PasswordHasher> AuthStrategy for BasicAuth<Users, H> {
    type User = Users::User;

    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<Self::User>> {
        let Some(header) = self.authorization_header(headers) else {
            return Ok(None);
        };
        let Some(credentials) = basic::credentials_from_header(header) else {
            tracing::debug!("malformed basic authorization header");
            return Ok(None);
        };

        self.authenticate(&credentials).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Self::User>> {
        Ok(basic::resolve_user(credentials, &self.users, &self.hasher).await)
    }
}

/// Authenticates requests by an opaque session token carried in a cookie.
///
/// Which sessions are live is up to the store: a [`MemorySessionStore`] keeps
/// them forever, [`Expiring`] bounds their lifetime and [`Persisted`] makes
/// them survive restarts.
pub struct SessionAuth<Users, Store, H = Argon2Hasher> {
    users: Users,
    sessions: Arc<Store>,
    cookie_name: String,
    hasher: H,
    max_age: Option<Duration>,
}

/// Session tokens which stop resolving after a fixed duration.
pub type ExpiringSessionAuth<Users, H = Argon2Hasher> =
    SessionAuth<Users, Expiring<MemorySessionStore>, H>;

/// Expiring session tokens mirrored to a durable backend.
pub type PersistedSessionAuth<Users, B, H = Argon2Hasher> =
    SessionAuth<Users, Persisted<Expiring<MemorySessionStore>, B>, H>;

impl<Users: UserStore, Store: SessionStore> SessionAuth<Users, Store> {
    /// Creates the strategy, reading tokens from the cookie named
    /// `cookie_name`.
    pub fn new(users: Users, sessions: Store, cookie_name: impl Into<String>) -> Self {
        Self {
            users,
            sessions: Arc::new(sessions),
            cookie_name: cookie_name.into(),
            hasher: Argon2Hasher::default(),
            max_age: None,
        }
    }
}

impl<Users: UserStore> SessionAuth<Users, Expiring<MemorySessionStore>> {
    /// Creates an in-memory strategy whose sessions live as long as `policy`
    /// allows.
    pub fn expiring(users: Users, cookie_name: impl Into<String>, policy: ExpirationPolicy) -> Self {
        let sessions = Expiring::new(MemorySessionStore::new(), policy);
        Self::new(users, sessions, cookie_name).with_max_age(policy.duration())
    }
}

impl<Users: UserStore, B: PersistenceBackend> SessionAuth<Users, Persisted<Expiring<MemorySessionStore>, B>> {
    /// Creates a strategy whose sessions live as long as `policy` allows and
    /// are mirrored to `backend`.
    ///
    /// Nothing is read from the backend up front; call
    /// [`Persisted::warm`] on [`sessions`](Self::sessions) to do so.
    pub fn persisted(
        users: Users,
        cookie_name: impl Into<String>,
        policy: ExpirationPolicy,
        backend: B,
    ) -> Self {
        let sessions = Persisted::new(Expiring::new(MemorySessionStore::new(), policy), backend);
        Self::new(users, sessions, cookie_name).with_max_age(policy.duration())
    }
}

impl<Users, Store, H> SessionAuth<Users, Store, H> {
    /// Verifies passwords with `hasher` instead.
    pub fn with_hasher<H2: PasswordHasher>(self, hasher: H2) -> SessionAuth<Users, Store, H2> {
        SessionAuth {
            users: self.users,
            sessions: self.sessions,
            cookie_name: self.cookie_name,
            hasher,
            max_age: self.max_age,
        }
    }

    /// Sets the `Max-Age` of issued cookies; `None` issues session cookies.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age.filter(|max_age| max_age.is_positive());
        self
    }

    /// Returns the session store.
    pub fn sessions(&self) -> &Store {
        &self.sessions
    }

    /// Returns the name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

impl<Users: Clone, Store, H: Clone> Clone for SessionAuth<Users, Store, H> {
    fn clone(&self) -> Self {
        Self {
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            cookie_name: self.cookie_name.clone(),
            hasher: self.hasher.clone(),
            max_age: self.max_age,
        }
    }
}

impl<Users, Store: fmt::Debug, H: fmt::Debug> fmt::Debug for SessionAuth<Users, Store, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuth")
            .field("sessions", &self.sessions)
            .field("cookie_name", &self.cookie_name)
            .field("hasher", &self.hasher)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<Users, Store, H> AuthStrategy for SessionAuth<Users, Store, H>
where
    Users: UserStore,
    Store: SessionStore,
    H: PasswordHasher,
{
    type User = Users::User;

    fn session_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == self.cookie_name)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty())
    }

    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<Self::User>> {
        let Some(token) = self.session_cookie(headers) else {
            return Ok(None);
        };

        let session_id = SessionId::from(token);
        let Some(user_id) = self.sessions.user_id_for_session(&session_id).await? else {
            tracing::debug!(session.id = ?session_id, "unknown or expired session");
            return Ok(None);
        };

        match self.users.get_user(&user_id).await {
            Ok(None) => {
                tracing::debug!(user.id = %user_id, "session points at a missing user");
                Ok(None)
            }
            Ok(user) => Ok(user),
            Err(err) => {
                tracing::warn!(err = %err, user.id = %user_id, "user lookup failed for session");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user.id = %user_id), err)]
    async fn create_session(&self, user_id: &UserId) -> Result<Option<SessionId>> {
        Ok(self
            .sessions
            .create(user_id)
            .await?
            .map(|record| record.session_id))
    }

    #[tracing::instrument(level = "debug", skip_all, ret, err)]
    async fn destroy_session(&self, headers: &HeaderMap) -> Result<bool> {
        let Some(token) = self.session_cookie(headers) else {
            return Ok(false);
        };

        self.sessions.destroy(&SessionId::from(token)).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user.id = %user_id), ret, err)]
    async fn destroy_sessions_for_user(&self, user_id: &UserId) -> Result<usize> {
        self.sessions.destroy_for_user(user_id).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Self::User>> {
        Ok(basic::resolve_user(credentials, &self.users, &self.hasher).await)
    }

    fn session_cookie_for(&self, session_id: &SessionId) -> Option<Cookie<'static>> {
        let mut builder = Cookie::build((self.cookie_name.clone(), session_id.as_str().to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }

        Some(builder.build())
    }

    fn removal_cookie(&self) -> Option<Cookie<'static>> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();

        Some(cookie)
    }
}
