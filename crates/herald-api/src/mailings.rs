use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use tracing::{error, info, warn};
use uuid::Uuid;

use herald_db::mailings::MailingFields;
use herald_dispatch::Caller;
use herald_types::api::{MailingRequest, Notice};
use herald_types::models::{Mailing, MailingAttempt};

use crate::auth::AppState;
use crate::error::ApiError;

/// Request fields in their stored text form.
struct StoredFields {
    start_time: String,
    end_time: String,
    message_id: String,
    recipient_ids: Vec<String>,
}

fn validate(state: &AppState, req: &MailingRequest) -> Result<StoredFields, ApiError> {
    if req.end_time < req.start_time {
        return Err(ApiError::BadRequest("end_time must not be before start_time".into()));
    }

    let message_id = req.message_id.to_string();
    if state.db.get_message(&message_id)?.is_none() {
        return Err(ApiError::BadRequest(format!("message {} does not exist", message_id)));
    }

    let mut recipient_ids: Vec<String> = req.recipient_ids.iter().map(Uuid::to_string).collect();
    recipient_ids.sort();
    recipient_ids.dedup();
    let missing = state.db.missing_recipients(&recipient_ids)?;
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "unknown recipients: {}",
            missing.join(", ")
        )));
    }

    Ok(StoredFields {
        start_time: req.start_time.to_rfc3339_opts(SecondsFormat::Micros, true),
        end_time: req.end_time.to_rfc3339_opts(SecondsFormat::Micros, true),
        message_id,
        recipient_ids,
    })
}

fn load(state: &AppState, caller: &Caller, id: Uuid) -> Result<Mailing, ApiError> {
    let mailing = find(state, id)?.ok_or(ApiError::NotFound("mailing"))?;
    if !caller.may_access(mailing.owner_id) {
        return Err(ApiError::Forbidden("mailing"));
    }
    Ok(mailing)
}

fn find(state: &AppState, id: Uuid) -> Result<Option<Mailing>, ApiError> {
    let id = id.to_string();
    let Some(row) = state.db.get_mailing(&id)? else {
        return Ok(None);
    };
    let mut recipients = state.db.get_recipient_ids_for_mailings(std::slice::from_ref(&id))?;
    Ok(Some(row.into_model(recipients.remove(&id).unwrap_or_default())))
}

pub async fn list_mailings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = caller.visibility_scope();
    let mailings = crate::blocking(&state, move |inner| {
        let rows = inner.db.list_mailings(scope.as_deref())?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut recipients = inner.db.get_recipient_ids_for_mailings(&ids)?;

        let mailings: Vec<Mailing> = rows
            .into_iter()
            .map(|row| {
                let recipient_ids = recipients.remove(&row.id).unwrap_or_default();
                row.into_model(recipient_ids)
            })
            .collect();
        Ok(mailings)
    })
    .await?;
    Ok(Json(mailings))
}

pub async fn create_mailing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<MailingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stored = validate(&state, &req)?;

    let id = Uuid::new_v4();
    state.db.create_mailing(
        &id.to_string(),
        &caller.id.to_string(),
        &MailingFields {
            start_time: &stored.start_time,
            end_time: &stored.end_time,
            status: req.status.as_str(),
            message_id: &stored.message_id,
            recipient_ids: &stored.recipient_ids,
        },
    )?;

    let mailing = find(&state, id)?
        .ok_or_else(|| anyhow::anyhow!("Mailing {} vanished after insert", id))?;

    info!(
        "Mailing {} created by {} with {} recipients",
        id,
        caller.id,
        mailing.recipient_ids.len()
    );
    Ok((StatusCode::CREATED, Json(mailing)))
}

pub async fn get_mailing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, &caller, id)?))
}

/// Full replacement, including the status. This is how a mailing is closed by hand.
pub async fn update_mailing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<MailingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    let stored = validate(&state, &req)?;

    let updated = state.db.update_mailing(
        &id.to_string(),
        &MailingFields {
            start_time: &stored.start_time,
            end_time: &stored.end_time,
            status: req.status.as_str(),
            message_id: &stored.message_id,
            recipient_ids: &stored.recipient_ids,
        },
    )?;
    if !updated {
        return Err(ApiError::NotFound("mailing"));
    }

    let mailing = find(&state, id)?.ok_or(ApiError::NotFound("mailing"))?;
    Ok(Json(mailing))
}

/// Attempts and recipient links go with the mailing; recipients stay.
pub async fn delete_mailing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    state.db.delete_mailing(&id.to_string())?;
    info!("Mailing {} deleted by {}", id, caller.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    let attempts: Vec<MailingAttempt> = state
        .db
        .list_attempts(Some(&id.to_string()))?
        .into_iter()
        .map(|row| row.into_model())
        .collect();
    Ok(Json(attempts))
}

/// HTTP trigger for dispatch. Both outcomes redirect to the mailing page with a notice;
/// a caller who fails the access check never reaches the dispatcher.
///
/// The run lives on its own task: a client that disconnects mid-run does not
/// cut it short, so every recipient still gets an attempt.
pub async fn send_mailing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let mailing = find(&state, id)?.ok_or(ApiError::NotFound("mailing"))?;
    let location = format!("/mailings/{}", id);

    if !caller.may_access(mailing.owner_id) {
        warn!("User {} denied dispatch of mailing {}", caller.id, id);
        return Ok(redirect_with_notice(
            location,
            Notice::error("You do not have permission to send this mailing."),
        ));
    }

    let run = {
        let state = state.clone();
        tokio::spawn(async move { state.dispatcher.dispatch(&state.db, id).await })
    };
    run.await.map_err(|e| {
        error!("dispatch task for mailing {} failed: {}", id, e);
        ApiError::Internal(anyhow::anyhow!("dispatch task failed"))
    })??;

    Ok(redirect_with_notice(location, Notice::success("Mailing sent.")))
}

fn redirect_with_notice(location: String, notice: Notice) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location)], Json(notice)).into_response()
}
