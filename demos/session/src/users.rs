use axum_auth_strategy::{
    memory_store::MemoryUserStore, Argon2Hasher, AuthUser, PasswordHasher, UserId,
};
use serde::Serialize;

#[derive(Clone, Serialize)]
pub struct User {
    id: UserId,
    pub email: String,
    #[serde(skip)]
    password_hash: String,
}

// Here we've implemented `Debug` manually to avoid accidentally logging the
// password hash.
impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

impl User {
    pub fn with_password_hash(self, password_hash: String) -> Self {
        Self {
            password_hash,
            ..self
        }
    }
}

impl AuthUser for User {
    fn id(&self) -> UserId {
        self.id.clone()
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

/// Seeds a store with a single user, `ferris@example.com` / `hunter42`.
pub async fn seeded() -> axum_auth_strategy::Result<MemoryUserStore<User>> {
    let users = MemoryUserStore::default();
    users
        .insert(User {
            id: UserId::new("1"),
            email: "ferris@example.com".into(),
            password_hash: Argon2Hasher::default().hash("hunter42")?,
        })
        .await;

    Ok(users)
}
