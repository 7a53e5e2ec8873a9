use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use herald_dispatch::Caller;
use herald_types::api::RecipientRequest;
use herald_types::models::Recipient;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::validation;

struct ValidRecipient {
    email: String,
    full_name: String,
    comment: Option<String>,
}

fn validate(req: &RecipientRequest) -> Result<ValidRecipient, ApiError> {
    Ok(ValidRecipient {
        email: validation::email(&req.email)?,
        full_name: validation::required("full_name", &req.full_name, 255)?,
        comment: validation::optional(req.comment.as_deref()),
    })
}

/// A concurrent writer can take the email between the lookup and the write.
fn duplicate_as_conflict(err: anyhow::Error, email: &str) -> ApiError {
    if herald_db::is_unique_violation(&err) {
        ApiError::Conflict(format!("recipient {} already exists", email))
    } else {
        ApiError::Internal(err)
    }
}

/// Load a recipient the caller may act on.
fn load(state: &AppState, caller: &Caller, id: Uuid) -> Result<Recipient, ApiError> {
    let recipient = state
        .db
        .get_recipient(&id.to_string())?
        .ok_or(ApiError::NotFound("recipient"))?
        .into_model();
    if !caller.may_access(recipient.owner_id) {
        return Err(ApiError::Forbidden("recipient"));
    }
    Ok(recipient)
}

pub async fn list_recipients(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = caller.visibility_scope();
    let recipients: Vec<Recipient> = state
        .db
        .list_recipients(scope.as_deref())?
        .into_iter()
        .map(|row| row.into_model())
        .collect();
    Ok(Json(recipients))
}

pub async fn create_recipient(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RecipientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = validate(&req)?;

    if state.db.get_recipient_by_email(&valid.email)?.is_some() {
        return Err(ApiError::Conflict(format!("recipient {} already exists", valid.email)));
    }

    let id = Uuid::new_v4().to_string();
    state
        .db
        .insert_recipient(
            &id,
            &valid.email,
            &valid.full_name,
            valid.comment.as_deref(),
            &caller.id.to_string(),
        )
        .map_err(|e| duplicate_as_conflict(e, &valid.email))?;

    let recipient = state
        .db
        .get_recipient(&id)?
        .ok_or_else(|| anyhow::anyhow!("Recipient {} vanished after insert", id))?
        .into_model();

    info!("Recipient {} created by {}", recipient.email, caller.id);
    Ok((StatusCode::CREATED, Json(recipient)))
}

pub async fn get_recipient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, &caller, id)?))
}

pub async fn update_recipient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RecipientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load(&state, &caller, id)?;
    let valid = validate(&req)?;

    if let Some(other) = state.db.get_recipient_by_email(&valid.email)? {
        if other.id != existing.id.to_string() {
            return Err(ApiError::Conflict(format!("recipient {} already exists", valid.email)));
        }
    }

    let id = id.to_string();
    let updated = state
        .db
        .update_recipient(&id, &valid.email, &valid.full_name, valid.comment.as_deref())
        .map_err(|e| duplicate_as_conflict(e, &valid.email))?;
    if !updated {
        return Err(ApiError::NotFound("recipient"));
    }

    let recipient = state
        .db
        .get_recipient(&id)?
        .ok_or(ApiError::NotFound("recipient"))?
        .into_model();
    Ok(Json(recipient))
}

pub async fn delete_recipient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, &caller, id)?;
    state.db.delete_recipient(&id.to_string())?;
    info!("Recipient {} deleted by {}", id, caller.id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_db::Database;

    #[test]
    fn unique_violation_becomes_conflict() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4().to_string();
        db.create_user(&owner, "alice", None, "hash").unwrap();
        db.insert_recipient("r1", "ann@example.com", "Ann", None, &owner).unwrap();

        let err = db
            .insert_recipient("r2", "ann@example.com", "Ann", None, &owner)
            .unwrap_err();
        let mapped = duplicate_as_conflict(err, "ann@example.com");
        assert!(matches!(mapped, ApiError::Conflict(_)));
        assert_eq!(mapped.status(), axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn other_store_errors_stay_internal() {
        let mapped = duplicate_as_conflict(anyhow::anyhow!("disk I/O error"), "ann@example.com");
        assert!(matches!(mapped, ApiError::Internal(_)));
    }
}
