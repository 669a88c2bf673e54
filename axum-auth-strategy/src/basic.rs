//! Decoding of `Authorization: Basic` credentials.
//!
//! Every step returns `None` on malformed input so the pipeline as a whole
//! fails closed without raising.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};

use crate::{user_store::UserStore, AuthUser, PasswordHasher};

/// The case-sensitive scheme prefix recognized in the header value.
pub const BASIC_PREFIX: &str = "Basic ";

/// A username (email) and password pair.
///
/// The password is kept behind [`SecretString`] so it never ends up in
/// `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    /// The username, which the user store treats as an email address.
    pub username: String,

    /// The plaintext password.
    pub password: SecretString,
}

impl Credentials {
    /// Creates credentials from a username and a plaintext password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Returns the base64 token following the `Basic ` prefix.
pub fn extract_base64(header: &str) -> Option<&str> {
    header.strip_prefix(BASIC_PREFIX)
}

/// Decodes a standard base64 token into UTF-8 text.
pub fn decode_base64(token: &str) -> Option<String> {
    let bytes = STANDARD.decode(token).ok()?;
    String::from_utf8(bytes).ok()
}

/// Splits decoded text on its first colon, so passwords may contain colons.
pub fn split_credentials(decoded: &str) -> Option<Credentials> {
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials::new(username, password))
}

/// Runs the whole header pipeline: scheme, base64, UTF-8, colon split.
pub fn credentials_from_header(header: &str) -> Option<Credentials> {
    let token = extract_base64(header)?;
    let decoded = decode_base64(token)?;
    split_credentials(&decoded)
}

/// Returns the first user registered under the credentials' email whose
/// stored digest verifies against the password.
///
/// Lookup errors collapse to `None`.
pub async fn resolve_user<Users, Hasher>(
    credentials: &Credentials,
    users: &Users,
    hasher: &Hasher,
) -> Option<Users::User>
where
    Users: UserStore,
    Hasher: PasswordHasher,
{
    let candidates = match users.find_by_email(&credentials.username).await {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(err = %err, "user lookup failed while resolving credentials");
            return None;
        }
    };

    let password = credentials.password.expose_secret();
    let user = candidates
        .into_iter()
        .find(|user| hasher.verify(user.password_hash(), password));

    if user.is_none() {
        tracing::debug!("credentials did not match a stored user");
    }

    user
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory_store::MemoryUserStore,
        test_helpers::{alice, fast_hasher, users_with_alice, TestUser},
        UserId,
    };

    fn basic_header(raw: &str) -> String {
        format!("{BASIC_PREFIX}{}", STANDARD.encode(raw))
    }

    #[test]
    fn test_extract_base64() {
        assert_eq!(extract_base64("Basic abc="), Some("abc="));
        assert_eq!(extract_base64("Basic "), Some(""));
        assert_eq!(extract_base64("basic abc="), None);
        assert_eq!(extract_base64("Bearer abc="), None);
        assert_eq!(extract_base64("Basicabc="), None);
        assert_eq!(extract_base64(""), None);
    }

    #[test]
    fn test_decode_base64() {
        assert_eq!(
            decode_base64("YWxpY2VAZXhhbXBsZS5jb206c2VjcmV0").as_deref(),
            Some("alice@example.com:secret")
        );
        assert_eq!(decode_base64("not base64!"), None);
        // Valid base64 of bytes which aren't UTF-8.
        assert_eq!(decode_base64(&STANDARD.encode([0xff, 0xfe, 0xfd])), None);
    }

    #[test]
    fn test_split_on_first_colon() {
        let creds = split_credentials("alice@example.com:pa:ss:word").unwrap();
        assert_eq!(creds.username, "alice@example.com");
        assert_eq!(creds.password.expose_secret(), "pa:ss:word");

        let creds = split_credentials(":").unwrap();
        assert_eq!(creds.username, "");
        assert_eq!(creds.password.expose_secret(), "");

        assert!(split_credentials("no-colon-here").is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("alice@example.com", "hunter42");
        let debug = format!("{creds:?}");

        assert!(debug.contains("alice@example.com"));
        assert!(!debug.contains("hunter42"));
    }

    #[tokio::test]
    async fn test_resolve_matching_user() {
        let users = users_with_alice().await;
        let creds = credentials_from_header(&basic_header("alice@example.com:secret")).unwrap();

        assert_eq!(
            resolve_user(&creds, &users, &fast_hasher()).await,
            Some(alice())
        );
    }

    #[tokio::test]
    async fn test_resolve_wrong_password() {
        let users = users_with_alice().await;
        let creds = credentials_from_header(&basic_header("alice@example.com:wrong")).unwrap();

        assert_eq!(resolve_user(&creds, &users, &fast_hasher()).await, None);
    }

    #[tokio::test]
    async fn test_resolve_unknown_email() {
        let users = users_with_alice().await;
        let creds = Credentials::new("mallory@example.com", "secret");

        assert_eq!(resolve_user(&creds, &users, &fast_hasher()).await, None);
    }

    #[tokio::test]
    async fn test_resolve_checks_every_candidate() {
        let hasher = fast_hasher();
        let users = MemoryUserStore::default();
        users
            .insert(TestUser::new(
                "1",
                "shared@example.com",
                &hasher.hash("first").unwrap(),
            ))
            .await;
        users
            .insert(TestUser::new(
                "2",
                "shared@example.com",
                &hasher.hash("second").unwrap(),
            ))
            .await;

        let creds = Credentials::new("shared@example.com", "second");
        let user = resolve_user(&creds, &users, &hasher).await.unwrap();
        assert_eq!(user.id(), UserId::new("2"));
    }

    #[tokio::test]
    async fn test_resolve_corrupt_digest() {
        let users = MemoryUserStore::default();
        users
            .insert(TestUser::new("1", "alice@example.com", "plaintext-oops"))
            .await;
        let creds = Credentials::new("alice@example.com", "plaintext-oops");

        assert_eq!(resolve_user(&creds, &users, &fast_hasher()).await, None);
    }

    #[test]
    fn test_header_pipeline() {
        assert!(credentials_from_header(&basic_header("no-colon-here")).is_none());
        assert!(credentials_from_header("Basic %%%").is_none());
        assert!(credentials_from_header(&STANDARD.encode("alice@example.com:secret")).is_none());

        let creds = credentials_from_header(&basic_header("alice@example.com:secret")).unwrap();
        assert_eq!(creds.username, "alice@example.com");
    }
}
