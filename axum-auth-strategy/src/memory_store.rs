//! An in-memory implementation of `UserStore`.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{user_store::UserStore, AuthUser, UserId};

/// An ephemeral user store, useful for testing and demonstration purposes.
#[derive(Clone, Debug)]
pub struct MemoryUserStore<User> {
    inner: Arc<RwLock<HashMap<UserId, User>>>,
}

impl<User> Default for MemoryUserStore<User> {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
        }
    }
}

impl<User: AuthUser> MemoryUserStore<User> {
    /// Creates a new memory store over a shared map.
    ///
    /// ```rust
    /// use std::{collections::HashMap, sync::Arc};
    ///
    /// use axum_auth_strategy::memory_store::MemoryUserStore;
    /// # use axum_auth_strategy::{AuthUser, UserId};
    /// # #[derive(Debug, Clone)]
    /// # struct User;
    /// # impl AuthUser for User {
    /// #     fn id(&self) -> UserId { UserId::new("1") }
    /// #     fn email(&self) -> &str { "" }
    /// #     fn password_hash(&self) -> &str { "" }
    /// # }
    /// use tokio::sync::RwLock;
    ///
    /// let inner = Arc::new(RwLock::new(HashMap::<UserId, User>::new()));
    /// let memory_store = MemoryUserStore::new(&inner);
    /// ```
    pub fn new(inner: &Arc<RwLock<HashMap<UserId, User>>>) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    /// Adds or replaces a user, keyed by its id.
    pub async fn insert(&self, user: User) {
        self.inner.write().await.insert(user.id(), user);
    }

    /// Removes a user, leaving any of its sessions dangling.
    pub async fn remove(&self, user_id: &UserId) -> Option<User> {
        self.inner.write().await.remove(user_id)
    }
}

#[async_trait]
impl<User: AuthUser> UserStore for MemoryUserStore<User> {
    type User = User;
    type Error = Infallible;

    async fn find_by_email(&self, email: &str) -> Result<Vec<Self::User>, Self::Error> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|user| user.email() == email)
            .cloned()
            .collect())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<Self::User>, Self::Error> {
        Ok(self.inner.read().await.get(user_id).cloned())
    }
}
