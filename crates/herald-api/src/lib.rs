pub mod auth;
pub mod error;
pub mod mailings;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod recipients;
pub mod statistics;
mod validation;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;

/// Every route of the HTTP surface. Transport-level layers (CORS, tracing)
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/", get(statistics::home))
        .route("/recipients", get(recipients::list_recipients).post(recipients::create_recipient))
        .route(
            "/recipients/{id}",
            get(recipients::get_recipient)
                .put(recipients::update_recipient)
                .delete(recipients::delete_recipient),
        )
        .route("/messages", get(messages::list_messages).post(messages::create_message))
        .route(
            "/messages/{id}",
            get(messages::get_message)
                .put(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/mailings", get(mailings::list_mailings).post(mailings::create_mailing))
        .route(
            "/mailings/{id}",
            get(mailings::get_mailing)
                .put(mailings::update_mailing)
                .delete(mailings::delete_mailing),
        )
        .route("/mailings/{id}/attempts", get(mailings::list_attempts))
        .route("/mailings/{id}/send", post(mailings::send_mailing))
        .route("/statistics", get(statistics::statistics))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run a batch of store queries off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
