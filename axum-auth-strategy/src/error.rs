use crate::persistence::PersistenceError;

/// Infrastructure failures surfaced by the strategies.
///
/// Routine authentication failures (malformed headers, wrong passwords,
/// unknown or expired sessions) never show up here: they resolve to "no
/// user". What remains is what a caller should answer with a server error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The durable session backend could not be read or written.
    #[error("session persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// A password digest could not be produced.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// The system random number generator failed.
    #[error("could not gather entropy for a session id")]
    Entropy,

    /// A configuration value could not be understood.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Crate-wide result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
