//! Run with
//!
//! ```not_rust
//! AUTH_TYPE=session_db_auth SESSION_DURATION=3600 cargo run -p demo-session
//! ```
//!
//! Then log in with
//!
//! ```not_rust
//! curl -i -d 'email=ferris@example.com&password=hunter42' localhost:3000/api/v1/auth_session/login
//! ```

use crate::web::App;

mod users;
mod web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| "axum_auth_strategy=debug,demo_session=debug,tower_http=debug".into(),
        )))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    App::new().await?.serve().await
}
