use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::AuthUser;

/// The authenticated user, as resolved by [`AuthLayer`](crate::AuthLayer).
///
/// Rejects with `401 Unauthorized` when the request isn't authenticated,
/// e.g. on an excluded path or when no layer is installed. Extract
/// `Option<CurrentUser<User>>` to make authentication optional.
#[derive(Debug, Clone)]
pub struct CurrentUser<User>(pub User);

#[async_trait]
impl<S, User> FromRequestParts<S> for CurrentUser<User>
where
    S: Send + Sync,
    User: AuthUser,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or((StatusCode::UNAUTHORIZED, "Not authenticated"))
    }
}
