use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use herald_dispatch::Caller;
use herald_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Validate the Bearer JWT, then attach a `Caller` carrying the user's
/// current group memberships.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?
    .claims;

    let user_id = claims.sub.to_string();
    // Tokens outlive accounts; a deleted user must not get through.
    if state.db.get_user_by_id(&user_id)?.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let groups = state.db.get_user_groups(&user_id)?;

    req.extensions_mut().insert(Caller { id: claims.sub, groups });
    Ok(next.run(req).await)
}
