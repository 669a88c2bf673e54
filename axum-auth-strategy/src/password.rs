//! One-way password digests.

use std::fmt::Debug;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::{Error, Result};

/// A salted, adaptive one-way hash of plaintext passwords.
///
/// Implementations must fail closed: a digest that can't be parsed simply
/// doesn't verify.
pub trait PasswordHasher: Debug + Clone + Send + Sync + 'static {
    /// Produces a digest of `plaintext` under a fresh random salt.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Returns `true` if and only if `plaintext` produced `digest`.
    fn verify(&self, digest: &str, plaintext: &str) -> bool;
}

/// Argon2id in PHC string format.
///
/// Verification reads the cost parameters from the digest itself, so digests
/// minted under different parameters keep verifying after they change.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Creates a hasher which mints digests with the given cost parameters.
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| Error::Hash(err.to_string()))
    }

    fn verify(&self, digest: &str, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            tracing::debug!("stored password digest is not a PHC string");
            return false;
        };

        // The output comparison inside `verify_password` is constant-time.
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fast_hasher;

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let digest = hasher.hash("correct horse").unwrap();

        assert!(hasher.verify(&digest, "correct horse"));
        assert!(!hasher.verify(&digest, "battery staple"));
    }

    #[test]
    fn test_distinct_salts() {
        let hasher = fast_hasher();
        let first = hasher.hash("secret").unwrap();
        let second = hasher.hash("secret").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify(&first, "secret"));
        assert!(hasher.verify(&second, "secret"));
    }

    #[test]
    fn test_malformed_digest_fails_closed() {
        let hasher = fast_hasher();

        assert!(!hasher.verify("", "secret"));
        assert!(!hasher.verify("secret", "secret"));
        assert!(!hasher.verify("$argon2id$v=19$garbage", "secret"));
    }

    #[test]
    fn test_verify_ignores_configured_params() {
        let digest = fast_hasher().hash("secret").unwrap();

        assert!(Argon2Hasher::default().verify(&digest, "secret"));
    }

    #[test]
    fn test_empty_password() {
        let hasher = fast_hasher();
        let digest = hasher.hash("").unwrap();

        assert!(hasher.verify(&digest, ""));
        assert!(!hasher.verify(&digest, " "));
    }
}
