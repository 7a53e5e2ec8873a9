use axum::{Extension, Json, extract::State, response::IntoResponse};

use herald_dispatch::Caller;
use herald_types::api::{HomeSummary, MailingStats};

use crate::auth::AppState;
use crate::error::ApiError;

/// Dashboard counters. Always scoped to the caller's own mailings, managers included.
pub async fn home(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let (total, running, recipients) = state.db.home_summary(&caller.id.to_string())?;
    Ok(Json(HomeSummary {
        total_mailings: total.max(0) as u64,
        running_mailings: running.max(0) as u64,
        unique_recipients: recipients.max(0) as u64,
    }))
}

pub async fn statistics(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = caller.visibility_scope();
    let stats = crate::blocking(&state, move |inner| {
        let stats: Vec<MailingStats> = inner
            .db
            .mailing_stats(scope.as_deref())?
            .into_iter()
            .map(|row| row.into_model())
            .collect();
        Ok(stats)
    })
    .await?;
    Ok(Json(stats))
}
