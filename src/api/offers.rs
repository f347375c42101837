use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::middleware::auth::AuthUser;
use crate::api::AppState;
use crate::services::redemption::ActivateError;

#[derive(Debug)]
pub enum OffersApiError {
    Activate(ActivateError),
}

impl IntoResponse for OffersApiError {
    fn into_response(self) -> Response {
        let OffersApiError::Activate(e) = self;
        let (status, message) = match e {
            ActivateError::OfferNotFound => (StatusCode::NOT_FOUND, "Offer not found".to_string()),
            ActivateError::OfferInactive => {
                (StatusCode::CONFLICT, "Offer is not currently active".to_string())
            }
            ActivateError::OfferOutOfWindow => (
                StatusCode::CONFLICT,
                "Offer is not valid at this time".to_string(),
            ),
            ActivateError::UsageLimitReached => (
                StatusCode::CONFLICT,
                "You have reached the usage limit for this offer".to_string(),
            ),
            ActivateError::CodeSpaceExhausted => {
                tracing::error!("activation failed: code space exhausted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not issue an activation code".to_string(),
                )
            }
            ActivateError::Store(e) => {
                tracing::error!(error = %e, "activation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues an activation code for an offer to the authenticated customer.
/// Returns 201 for a fresh code, 200 when the caller already held a live
/// one.
async fn activate_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<Uuid>,
    user: AuthUser,
) -> Result<Response, OffersApiError> {
    let grant = state
        .service
        .activate(offer_id, user.user_id)
        .await
        .map_err(OffersApiError::Activate)?;

    let status = if grant.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let body = ActivateResponse {
        code: grant.activation.code,
        expires_at: grant.activation.expires_at,
    };

    Ok((status, Json(body)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/offers/:offer_id/activate", post(activate_offer))
}
