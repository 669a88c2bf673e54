use std::sync::OnceLock;

use argon2::Params;

use crate::{
    memory_store::MemoryUserStore, password::Argon2Hasher, AuthUser, PasswordHasher, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
}

impl TestUser {
    pub fn new(id: &str, email: &str, password_hash: &str) -> Self {
        Self {
            id: UserId::new(id),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
        }
    }
}

impl AuthUser for TestUser {
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

// Minimum-cost parameters so the suite isn't dominated by key stretching.
pub(crate) fn fast_hasher() -> Argon2Hasher {
    Argon2Hasher::new(Params::new(Params::MIN_M_COST, 1, 1, None).unwrap())
}

fn alice_digest() -> &'static str {
    static DIGEST: OnceLock<String> = OnceLock::new();
    DIGEST.get_or_init(|| fast_hasher().hash("secret").unwrap())
}

pub(crate) fn alice() -> TestUser {
    TestUser::new("alice-id", "alice@example.com", alice_digest())
}

pub(crate) async fn users_with_alice() -> MemoryUserStore<TestUser> {
    let users = MemoryUserStore::default();
    users.insert(alice()).await;
    users
}
