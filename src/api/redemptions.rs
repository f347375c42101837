use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::auth::AuthStaff;
use crate::api::AppState;
use crate::models::Activation;
use crate::services::redemption::RedeemError;

#[derive(Debug)]
pub enum RedemptionsApiError {
    Redeem(RedeemError),
}

impl IntoResponse for RedemptionsApiError {
    fn into_response(self) -> Response {
        let RedemptionsApiError::Redeem(e) = self;
        // Three distinct business outcomes, never collapsed: a staff
        // member must be able to tell "already used" from "not found"
        // from "expired".
        let (status, message) = match e {
            RedeemError::CodeNotFound => {
                (StatusCode::NOT_FOUND, "Invalid activation code".to_string())
            }
            RedeemError::AlreadyRedeemed => (
                StatusCode::CONFLICT,
                "Activation code has already been redeemed".to_string(),
            ),
            RedeemError::Expired => {
                (StatusCode::GONE, "Activation code has expired".to_string())
            }
            RedeemError::Store(e) => {
                tracing::error!(error = %e, "redemption failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub offer_id: Uuid,
    pub user_id: Uuid,
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// Redeems an activation code on behalf of the authenticated staff
/// member. Exactly one concurrent attempt per code succeeds.
async fn redeem(
    State(state): State<AppState>,
    staff: AuthStaff,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, RedemptionsApiError> {
    let activation = state
        .service
        .redeem(&request.code, staff.staff_id)
        .await
        .map_err(RedemptionsApiError::Redeem)?;

    Ok(Json(RedeemResponse {
        offer_id: activation.offer_id,
        user_id: activation.user_id,
        redeemed_at: activation.redeemed_at,
    }))
}

/// Current snapshot of the activation behind a code, for the staff UI.
/// Lazy expiry applies, so a pending record past its deadline shows as
/// expired here.
async fn show_redemption(
    State(state): State<AppState>,
    Path(code): Path<String>,
    _staff: AuthStaff,
) -> Result<Json<Activation>, RedemptionsApiError> {
    let activation = state
        .service
        .lookup(&code)
        .await
        .map_err(RedemptionsApiError::Redeem)?;

    Ok(Json(activation))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/redemptions", post(redeem))
        .route("/redemptions/:code", get(show_redemption))
}
