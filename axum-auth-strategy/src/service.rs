use std::{fmt, sync::Arc};

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use futures::future::BoxFuture;
use tower_http::auth::{AsyncAuthorizeRequest, AsyncRequireAuthorizationLayer};
use tracing::Instrument;

use crate::{AuthUser, DynStrategy, ExclusionList, Outcome};

/// A layer which runs every request through an [`AuthStrategy`](crate::AuthStrategy).
pub type AuthLayer<User> = AsyncRequireAuthorizationLayer<Authorize<User>>;

/// An authorizer for [`tower_http::auth::AsyncRequireAuthorizationLayer`].
///
/// Requests to excluded paths pass untouched. Otherwise a request carrying
/// no credentials is answered with `401 Unauthorized`, one whose credentials
/// don't resolve to a user with `403 Forbidden`, and one which hits an
/// infrastructure failure with `500 Internal Server Error`. Authenticated
/// requests carry the user, and every request passed on carries an
/// `Option<User>`, in their extensions.
pub struct Authorize<User> {
    strategy: DynStrategy<User>,
    exclusions: Arc<ExclusionList>,
}

impl<User: AuthUser> Authorize<User> {
    /// Creates an authorizer over `strategy`, letting `exclusions` through.
    pub fn new(strategy: DynStrategy<User>, exclusions: ExclusionList) -> Self {
        Self {
            strategy,
            exclusions: Arc::new(exclusions),
        }
    }

    /// Creates the layer installing an authorizer over `strategy`.
    pub fn layer(strategy: DynStrategy<User>, exclusions: ExclusionList) -> AuthLayer<User> {
        AsyncRequireAuthorizationLayer::new(Self::new(strategy, exclusions))
    }
}

impl<User> Clone for Authorize<User> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            exclusions: self.exclusions.clone(),
        }
    }
}

impl<User> fmt::Debug for Authorize<User> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorize")
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

fn status(status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    res
}

impl<User, ReqBody> AsyncAuthorizeRequest<ReqBody> for Authorize<User>
where
    User: AuthUser,
    ReqBody: Send + 'static,
{
    type RequestBody = ReqBody;
    type ResponseBody = Body;
    type Future = BoxFuture<'static, Result<Request<ReqBody>, Response<Body>>>;

    fn authorize(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let span = tracing::debug_span!(
            "authorize",
            path = %request.uri().path(),
            user.id = tracing::field::Empty
        );

        let strategy = self.strategy.clone();
        let exclusions = self.exclusions.clone();

        Box::pin(
            async move {
                let outcome = strategy
                    .resolve(Some(request.uri().path()), request.headers(), &exclusions)
                    .await;

                match outcome {
                    Ok(Outcome::NotRequired) => {
                        request.extensions_mut().insert(None::<User>);
                        Ok(request)
                    }
                    Ok(Outcome::Authenticated(user)) => {
                        tracing::Span::current().record("user.id", user.id().to_string());
                        request.extensions_mut().insert(Some(user.clone()));
                        request.extensions_mut().insert(user);
                        Ok(request)
                    }
                    Ok(Outcome::Missing) => {
                        tracing::debug!("request carries no credentials");
                        Err(status(StatusCode::UNAUTHORIZED))
                    }
                    Ok(Outcome::Rejected) => {
                        tracing::debug!("request credentials were rejected");
                        Err(status(StatusCode::FORBIDDEN))
                    }
                    Err(err) => {
                        tracing::error!(err = %err, "could not authenticate request");
                        Err(status(StatusCode::INTERNAL_SERVER_ERROR))
                    }
                }
            }
            .instrument(span),
        )
    }
}
