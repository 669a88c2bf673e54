use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use axum_auth_strategy::{
    memory_store::MemoryUserStore,
    session::{ExpirationPolicy, ResetTokens, SessionId},
    Argon2Hasher, AuthConfig, AuthMode, AuthUser, Authorize, CurrentUser, DynStrategy,
    ExclusionList, UserStore,
};
use serde::Deserialize;
use serde_json::json;

use crate::users::{self, User};

const RESET_TOKEN_SECONDS: u64 = 15 * 60;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetForm {
    reset_token: Option<String>,
    new_password: Option<String>,
}

#[derive(Clone)]
struct AppState {
    strategy: DynStrategy<User>,
    users: MemoryUserStore<User>,
    reset_tokens: ResetTokens,
    hasher: Argon2Hasher,
}

pub struct App {
    router: Router,
}

impl App {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(AuthConfig::from_env()?).await
    }

    async fn with_config(mut config: AuthConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.mode == AuthMode::Disabled {
            config.mode = AuthMode::ExpiringSession;
        }
        tracing::info!(mode = %config.mode, "starting with authentication");

        let users = users::seeded().await?;
        let Some(strategy) = config.build_strategy(users.clone()).await? else {
            return Err("authentication is disabled".into());
        };

        let exclusions: ExclusionList = config
            .excluded_paths
            .patterns()
            .iter()
            .cloned()
            .chain(["/api/v1/reset_password/".to_owned()])
            .collect();

        let state = AppState {
            strategy: strategy.clone(),
            users,
            reset_tokens: ResetTokens::new(ExpirationPolicy::from_secs(RESET_TOKEN_SECONDS)),
            hasher: Argon2Hasher::default(),
        };

        let router = Router::new()
            .route("/api/v1/status", get(status))
            .route("/api/v1/auth_session/login", post(login))
            .route("/api/v1/auth_session/logout", delete(logout))
            .route("/api/v1/auth_session/sessions", delete(logout_everywhere))
            .route(
                "/api/v1/reset_password",
                post(request_reset).put(reset_password),
            )
            .route("/api/v1/users/me", get(me))
            .layer(Authorize::layer(strategy, exclusions))
            .with_state(state);

        Ok(Self { router })
    }

    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
        axum::serve(listener, self.router.into_make_service()).await?;

        Ok(())
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let Some(email) = non_empty(form.email) else {
        return error(StatusCode::BAD_REQUEST, "email missing");
    };
    let Some(password) = non_empty(form.password) else {
        return error(StatusCode::BAD_REQUEST, "password missing");
    };

    match state.users.find_by_email(&email).await {
        Ok(candidates) if candidates.is_empty() => {
            return error(StatusCode::NOT_FOUND, "no user found for this email");
        }
        Ok(_) => {}
        Err(never) => match never {},
    }

    match state.strategy.login(&email, &password).await {
        Ok(Some((user, session_id))) => {
            let Some(cookie) = state.strategy.session_cookie_for(&session_id) else {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            };
            ([(SET_COOKIE, cookie.to_string())], Json(user)).into_response()
        }
        Ok(None) => error(StatusCode::UNAUTHORIZED, "wrong password"),
        Err(err) => {
            tracing::error!(err = %err, "login failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn with_removal_cookie(strategy: &DynStrategy<User>, mut res: Response) -> Response {
    if let Some(cookie) = strategy.removal_cookie() {
        if let Ok(value) = cookie.to_string().parse() {
            res.headers_mut().insert(SET_COOKIE, value);
        }
    }
    res
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.strategy.destroy_session(&headers).await {
        Ok(true) => with_removal_cookie(&state.strategy, Json(json!({})).into_response()),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!(err = %err, "logout failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout_everywhere(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser<User>,
) -> Response {
    match state.strategy.destroy_sessions_for_user(&user.id()).await {
        Ok(ended) => with_removal_cookie(
            &state.strategy,
            Json(json!({ "sessions_ended": ended })).into_response(),
        ),
        Err(err) => {
            tracing::error!(err = %err, "logout failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_reset(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Response {
    let Some(email) = non_empty(form.email) else {
        return error(StatusCode::BAD_REQUEST, "email missing");
    };

    match state.reset_tokens.issue_for_email(&state.users, &email).await {
        Ok(Some(token)) => {
            Json(json!({ "email": email, "reset_token": token.as_str() })).into_response()
        }
        Ok(None) => StatusCode::FORBIDDEN.into_response(),
        Err(err) => {
            tracing::error!(err = %err, "could not issue reset token");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn reset_password(State(state): State<AppState>, Form(form): Form<ResetForm>) -> Response {
    let (Some(token), Some(new_password)) =
        (non_empty(form.reset_token), non_empty(form.new_password))
    else {
        return error(StatusCode::BAD_REQUEST, "reset_token and new_password required");
    };

    let reset = match state
        .reset_tokens
        .redeem(&SessionId::from(token), &new_password, &state.hasher)
        .await
    {
        Ok(Some(reset)) => reset,
        Ok(None) => return StatusCode::FORBIDDEN.into_response(),
        Err(err) => {
            tracing::error!(err = %err, "could not reset password");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let user = match state.users.get_user(&reset.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::FORBIDDEN.into_response(),
        Err(never) => match never {},
    };
    let email = user.email.clone();
    state
        .users
        .insert(user.with_password_hash(reset.password_hash))
        .await;

    Json(json!({ "email": email, "message": "Password updated" })).into_response()
}

async fn me(CurrentUser(user): CurrentUser<User>) -> Json<User> {
    Json(user)
}
