use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::auth::{AuthStaff, AuthUser};
use crate::api::AppState;
use crate::models::{Activation, ActivationStatus};
use crate::store::{ActivationFilter, StoreError};

#[derive(Debug)]
pub enum ActivationsApiError {
    Database(StoreError),
}

impl IntoResponse for ActivationsApiError {
    fn into_response(self) -> Response {
        let ActivationsApiError::Database(e) = self;
        tracing::error!(error = %e, "activation listing failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<ActivationStatus>,
    pub offer_id: Option<Uuid>,
}

/// Recent activations for the staff audit view, optionally filtered by
/// status and offer.
async fn list_activations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    _staff: AuthStaff,
) -> Result<Json<Vec<Activation>>, ActivationsApiError> {
    let filter = ActivationFilter {
        status: params.status,
        offer_id: params.offer_id,
        user_id: None,
    };

    let activations = state
        .service
        .recent_activations(filter)
        .await
        .map_err(ActivationsApiError::Database)?;

    Ok(Json(activations))
}

/// The authenticated customer's own activation history.
async fn my_activations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Activation>>, ActivationsApiError> {
    let activations = state
        .service
        .user_activations(user.user_id)
        .await
        .map_err(ActivationsApiError::Database)?;

    Ok(Json(activations))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activations", get(list_activations))
        .route("/activations/mine", get(my_activations))
}
