use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use herald_dispatch::Caller;
use herald_types::api::UpdateProfileRequest;
use herald_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::validation;

fn load_profile(state: &AppState, caller: &Caller) -> Result<User, ApiError> {
    let id = caller.id.to_string();
    let user = state.db.get_user_by_id(&id)?.ok_or(ApiError::Unauthorized)?;
    let groups = state.db.get_user_groups(&id)?;
    Ok(user.into_model(groups))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_profile(&state, &caller)?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters".into()));
    }
    let email = match validation::optional(req.email.as_deref()) {
        Some(raw) => Some(validation::email(&raw)?),
        None => None,
    };
    let phone_number = validation::optional(req.phone_number.as_deref());
    let country = validation::optional(req.country.as_deref());

    let id = caller.id.to_string();
    if let Some(other) = state.db.get_user_by_username(username)? {
        if other.id != id {
            return Err(ApiError::Conflict(format!("username '{}' is taken", username)));
        }
    }

    if !state.db.update_profile(
        &id,
        username,
        email.as_deref(),
        phone_number.as_deref(),
        country.as_deref(),
    )? {
        return Err(ApiError::Unauthorized);
    }

    info!("Profile of {} updated", id);
    Ok(Json(load_profile(&state, &caller)?))
}
