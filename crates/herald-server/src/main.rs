use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use herald_api::auth::{AppState, AppStateInner};
use herald_dispatch::Dispatcher;

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug,tower_http=debug".into()),
        )
        .init();

    let jwt_secret = std::env::var("HERALD_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: HERALD_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db_path = std::env::var("HERALD_DB_PATH").unwrap_or_else(|_| "herald.db".into());
    let host = std::env::var("HERALD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HERALD_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = herald_db::Database::open(&PathBuf::from(&db_path))?;

    let dispatcher = Dispatcher::from_env()?;

    let state: AppState = Arc::new(AppStateInner { db, jwt_secret, dispatcher });

    let app = herald_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Herald server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
