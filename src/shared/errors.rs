use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::error;
use thiserror::Error;

/// Error taxonomy for the API surface.
///
/// Read paths never produce `Internal` towards the caller (they degrade to an
/// empty result and log instead); mutations surface the full taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        error!("Failed to get database connection: {e}");
        ApiError::Internal
    }
}

impl From<DieselError> for ApiError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => ApiError::NotFound("Record not found".to_string()),
            other => {
                error!("Store error: {other}");
                ApiError::Internal
            }
        }
    }
}

/// Which user-facing field a unique-constraint violation is about, judged by
/// the constraint/message text the store reports.
pub fn unique_violation_field(e: &DieselError) -> Option<&'static str> {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = e {
        let message = info.message().to_lowercase();
        let detail = info
            .constraint_name()
            .map(|c| c.to_lowercase())
            .unwrap_or_default();
        if message.contains("phone") || detail.contains("phone") {
            return Some("phone");
        }
        if message.contains("email") || detail.contains("email") {
            return Some("email");
        }
        return Some("record");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_violation(message: &str) -> DieselError {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(message.to_string()),
        )
    }

    #[test]
    fn phone_constraint_is_recognized() {
        let e = unique_violation("duplicate key value violates unique constraint \"leads_phone_key\"");
        assert_eq!(unique_violation_field(&e), Some("phone"));
    }

    #[test]
    fn email_constraint_is_recognized() {
        let e = unique_violation("duplicate key value violates unique constraint \"leads_email_key\"");
        assert_eq!(unique_violation_field(&e), Some("email"));
    }

    #[test]
    fn other_unique_violations_fall_back_to_record() {
        let e = unique_violation("duplicate key value violates unique constraint \"leads_pkey\"");
        assert_eq!(unique_violation_field(&e), Some("record"));
    }

    #[test]
    fn non_constraint_errors_are_ignored() {
        assert_eq!(unique_violation_field(&DieselError::NotFound), None);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
