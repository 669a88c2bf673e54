//! Pluggable request authentication for Axum.
//!
//! This crate decides, for each incoming request, whether the caller is
//! authenticated and which user they represent. The decision is made by an
//! [`AuthStrategy`], and strategies are interchangeable:
//!
//! 1. [`NoAuth`], which authenticates no one,
//! 2. [`BasicAuth`], which checks `Authorization: Basic` credentials on every
//!    request,
//! 3. [`SessionAuth`], which resolves an opaque token carried in a cookie,
//! 4. [`ExpiringSessionAuth`], whose tokens stop resolving after a fixed
//!    duration,
//! 5. [`PersistedSessionAuth`], whose tokens survive a restart.
//!
//! User storage is decoupled from authentication: any storage engine for which
//! [`UserStore`] is implemented is supported, and any user type implementing
//! [`AuthUser`] may be used. Password digests are checked through a
//! [`PasswordHasher`], Argon2id by default.
//!
//! # Sessions
//!
//! Session strategies are built over a [`SessionStore`](session::SessionStore).
//! Stores compose by wrapping: [`Expiring`](session::Expiring) hides records
//! past their lifetime and [`Persisted`](session::Persisted) mirrors records
//! to a [`PersistenceBackend`](persistence::PersistenceBackend), such as a
//! JSON [`FileBackend`](persistence::FileBackend) or, with the `sqlite`
//! feature, a `SqliteBackend`.
//!
//! [`ResetTokens`](session::ResetTokens) issues single-use password reset
//! tokens from the same id generator and expiry policy.
//!
//! # Middleware
//!
//! [`AuthLayer`] runs a strategy ahead of your handlers. Paths matching the
//! configured [`ExclusionList`] pass untouched; other requests are refused
//! with `401` when they carry no credentials and with `403` when their
//! credentials don't resolve to a user. Handlers get at the user with the
//! [`CurrentUser`] extractor.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use axum_auth_strategy::{
//!     memory_store::MemoryUserStore, AuthConfig, AuthUser, CurrentUser, UserId,
//! };
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: UserId,
//!     email: String,
//!     password_hash: String,
//! }
//!
//! impl AuthUser for User {
//!     fn id(&self) -> UserId {
//!         self.id.clone()
//!     }
//!
//!     fn email(&self) -> &str {
//!         &self.email
//!     }
//!
//!     fn password_hash(&self) -> &str {
//!         &self.password_hash
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = MemoryUserStore::<User>::default();
//!     let config = AuthConfig::from_env()?;
//!
//!     let mut app = Router::new().route(
//!         "/api/v1/users/me",
//!         get(|CurrentUser(user): CurrentUser<User>| async move { user.email }),
//!     );
//!     if let Some(auth_layer) = config.auth_layer(users).await? {
//!         app = app.layer(auth_layer);
//!     }
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod basic;
mod config;
mod error;
mod extract;
pub mod memory_store;
mod password;
mod path;
pub mod persistence;
mod service;
pub mod session;
mod strategy;
mod user_store;

#[cfg(test)]
mod test_helpers;

pub use basic::Credentials;
pub use config::{
    AuthConfig, AuthMode, DEFAULT_EXCLUDED_PATHS, DEFAULT_SESSION_NAME,
    DEFAULT_SESSION_STORE_PATH,
};
pub use error::{Error, Result};
pub use extract::CurrentUser;
pub use password::{Argon2Hasher, PasswordHasher};
pub use path::{requires_auth, ExclusionList};
pub use service::{AuthLayer, Authorize};
pub use strategy::{
    AuthStrategy, BasicAuth, DynStrategy, ExpiringSessionAuth, NoAuth, Outcome,
    PersistedSessionAuth, SessionAuth,
};
pub use tower_cookies::cookie;
pub use user_store::{AuthUser, UserId, UserStore};
