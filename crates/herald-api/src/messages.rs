use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use herald_dispatch::Caller;
use herald_types::api::MessageRequest;
use herald_types::models::Message;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::validation;

fn validate(req: &MessageRequest) -> Result<(String, String), ApiError> {
    let subject = validation::required("subject", &req.subject, 255)?;
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body is required".into()));
    }
    Ok((subject, req.body.clone()))
}

fn load(state: &AppState, caller: &Caller, id: Uuid) -> Result<Message, ApiError> {
    let message = state
        .db
        .get_message(&id.to_string())?
        .ok_or(ApiError::NotFound("message"))?
        .into_model();
    if !caller.may_access(message.owner_id) {
        return Err(ApiError::Forbidden("message"));
    }
    Ok(message)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = caller.visibility_scope();
    let messages: Vec<Message> = state
        .db
        .list_messages(scope.as_deref())?
        .into_iter()
        .map(|row| row.into_model())
        .collect();
    Ok(Json(messages))
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (subject, body) = validate(&req)?;

    let id = Uuid::new_v4().to_string();
    state.db.insert_message(&id, &subject, &body, &caller.id.to_string())?;

    let message = state
        .db
        .get_message(&id)?
        .ok_or_else(|| anyhow::anyhow!("Message {} vanished after insert", id))?
        .into_model();

    info!("Message {} created by {}", id, caller.id);
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, &caller, id)?))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    let (subject, body) = validate(&req)?;

    let id = id.to_string();
    if !state.db.update_message(&id, &subject, &body)? {
        return Err(ApiError::NotFound("message"));
    }

    let message = state
        .db
        .get_message(&id)?
        .ok_or(ApiError::NotFound("message"))?
        .into_model();
    Ok(Json(message))
}

/// Also removes every mailing that sends this message.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    state.db.delete_message(&id.to_string())?;
    info!("Message {} deleted by {}", id, caller.id);
    Ok(StatusCode::NO_CONTENT)
}
