use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

use serde::Deserialize;

use crate::{
    persistence::{FileBackend, PersistenceBackend},
    service::{AuthLayer, Authorize},
    session::{ExpirationPolicy, MemorySessionStore},
    user_store::UserStore,
    BasicAuth, DynStrategy, Error, ExclusionList, NoAuth, Result, SessionAuth,
};

/// The default name of the session cookie.
pub const DEFAULT_SESSION_NAME: &str = "_my_session_id";

/// Where `session_db_auth` keeps sessions unless told otherwise.
pub const DEFAULT_SESSION_STORE_PATH: &str = ".db_UserSession.json";

/// Paths reachable without authentication unless told otherwise.
pub const DEFAULT_EXCLUDED_PATHS: &str =
    "/api/v1/status/,/api/v1/unauthorized/,/api/v1/forbidden/,/api/v1/auth_session/login/";

/// Which strategy guards the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthMode {
    /// No strategy is installed and nothing is checked.
    #[default]
    Disabled,

    /// [`NoAuth`]: every protected path is refused.
    NoAuth,

    /// [`BasicAuth`].
    Basic,

    /// [`SessionAuth`] over an in-memory store.
    Session,

    /// [`ExpiringSessionAuth`](crate::ExpiringSessionAuth).
    ExpiringSession,

    /// [`PersistedSessionAuth`](crate::PersistedSessionAuth).
    PersistedSession,
}

impl AuthMode {
    /// Returns the canonical `AUTH_TYPE` value for the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::NoAuth => "auth",
            Self::Basic => "basic_auth",
            Self::Session => "session_auth",
            Self::ExpiringSession => "session_exp_auth",
            Self::PersistedSession => "session_db_auth",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::Disabled),
            "auth" | "no_auth" => Ok(Self::NoAuth),
            "basic_auth" | "basic" => Ok(Self::Basic),
            "session_auth" | "session" => Ok(Self::Session),
            "session_exp_auth" | "expiring_session" => Ok(Self::ExpiringSession),
            "session_db_auth" | "persisted_session" => Ok(Self::PersistedSession),
            other => Err(Error::Config(format!("unknown auth type `{other}`"))),
        }
    }
}

impl TryFrom<String> for AuthMode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Settings selecting and tuning the authentication strategy.
///
/// Load it from the process environment with [`from_env`](Self::from_env) or
/// deserialize it from any serde source; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The strategy to install (`AUTH_TYPE`).
    pub mode: AuthMode,

    /// The session cookie name (`SESSION_NAME`).
    pub session_name: String,

    /// Session lifetime in seconds, zero for no expiry (`SESSION_DURATION`).
    pub session_duration: u64,

    /// Paths exempt from authentication (`AUTH_EXCLUDED_PATHS`).
    pub excluded_paths: ExclusionList,

    /// The JSON document persisted sessions live in (`SESSION_STORE_PATH`).
    pub session_store_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            session_name: DEFAULT_SESSION_NAME.to_owned(),
            session_duration: 0,
            excluded_paths: ExclusionList::parse(DEFAULT_EXCLUDED_PATHS),
            session_store_path: PathBuf::from(DEFAULT_SESSION_STORE_PATH),
        }
    }
}

impl AuthConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// A `SESSION_DURATION` which isn't a non-negative integer means no
    /// expiry, while an unknown `AUTH_TYPE` is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = lookup("AUTH_TYPE") {
            config.mode = mode.parse()?;
        }

        if let Some(name) = lookup("SESSION_NAME").filter(|name| !name.trim().is_empty()) {
            config.session_name = name.trim().to_owned();
        }

        if let Some(duration) = lookup("SESSION_DURATION") {
            config.session_duration = duration.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(duration = %duration, "ignoring non-numeric session duration");
                0
            });
        }

        if let Some(paths) = lookup("AUTH_EXCLUDED_PATHS") {
            config.excluded_paths = ExclusionList::parse(&paths);
        }

        if let Some(path) = lookup("SESSION_STORE_PATH").filter(|path| !path.trim().is_empty()) {
            config.session_store_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Returns the policy implied by the session duration.
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::from_secs(self.session_duration)
    }

    /// Builds the configured strategy, persisting sessions to
    /// `session_store_path` when the mode calls for it.
    ///
    /// Returns `None` when authentication is disabled.
    pub async fn build_strategy<Users: UserStore>(
        &self,
        users: Users,
    ) -> Result<Option<DynStrategy<Users::User>>> {
        let backend = FileBackend::new(&self.session_store_path);
        self.build_strategy_with_backend(users, backend).await
    }

    /// Builds the configured strategy, persisting sessions to `backend` when
    /// the mode calls for it.
    ///
    /// Persisted sessions are restored from the backend before returning.
    #[tracing::instrument(level = "debug", skip_all, fields(mode = %self.mode), err)]
    pub async fn build_strategy_with_backend<Users, B>(
        &self,
        users: Users,
        backend: B,
    ) -> Result<Option<DynStrategy<Users::User>>>
    where
        Users: UserStore,
        B: PersistenceBackend,
    {
        let cookie_name = self.session_name.clone();
        let policy = self.expiration_policy();

        let strategy: DynStrategy<Users::User> = match self.mode {
            AuthMode::Disabled => return Ok(None),
            AuthMode::NoAuth => Arc::new(NoAuth::new()),
            AuthMode::Basic => Arc::new(BasicAuth::new(users)),
            AuthMode::Session => Arc::new(SessionAuth::new(
                users,
                MemorySessionStore::new(),
                cookie_name,
            )),
            AuthMode::ExpiringSession => {
                Arc::new(SessionAuth::expiring(users, cookie_name, policy))
            }
            AuthMode::PersistedSession => {
                let strategy = SessionAuth::persisted(users, cookie_name, policy, backend);
                let restored = strategy.sessions().warm().await?;
                tracing::info!(restored, "restored persisted sessions");
                Arc::new(strategy)
            }
        };

        Ok(Some(strategy))
    }

    /// Builds the configured strategy wrapped in an [`AuthLayer`].
    ///
    /// Returns `None` when authentication is disabled.
    pub async fn auth_layer<Users: UserStore>(
        &self,
        users: Users,
    ) -> Result<Option<AuthLayer<Users::User>>> {
        Ok(self
            .build_strategy(users)
            .await?
            .map(|strategy| Authorize::layer(strategy, self.excluded_paths.clone())))
    }
}
