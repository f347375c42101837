use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// Identity headers injected by the authenticating gateway. Session and
/// login handling live with the auth collaborator in front of this
/// service; by the time a request reaches these handlers the caller has
/// already been authenticated and their id stamped onto the request.
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_STAFF_ID: &str = "x-staff-id";

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
        }
    }
}

/// Extractor for the authenticated customer identity
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extractor for the authenticated staff identity
#[derive(Debug, Clone, Copy)]
pub struct AuthStaff {
    pub staff_id: Uuid,
}

fn identity_header(parts: &Parts, name: &str) -> Result<Uuid, AuthError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or(AuthError::Unauthorized)
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = identity_header(parts, HEADER_USER_ID)?;
        Ok(AuthUser { user_id })
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthStaff {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let staff_id = identity_header(parts, HEADER_STAFF_ID)?;
        Ok(AuthStaff { staff_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(name: &str, value: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn extracts_valid_user_identity() {
        let id = Uuid::new_v4();
        let mut parts = parts_with(HEADER_USER_ID, &id.to_string());
        let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.user_id, id);
    }

    #[tokio::test]
    async fn rejects_missing_or_malformed_identity() {
        let (mut bare, ()) = Request::builder().body(()).unwrap().into_parts();
        assert!(AuthUser::from_request_parts(&mut bare, &()).await.is_err());

        let mut malformed = parts_with(HEADER_STAFF_ID, "not-a-uuid");
        assert!(AuthStaff::from_request_parts(&mut malformed, &())
            .await
            .is_err());
    }
}
