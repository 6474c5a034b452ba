use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An active subscription for this service already exists")]
    AlreadyActive,

    #[error("Subscription period overlaps an existing subscription")]
    OverlapExists,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code, message) = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                )
            }
            AppError::NotFound(msg) => {
                log::warn!("Not found: {msg}");
                (
                    actix_web::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    msg.clone(),
                )
            }
            AppError::AlreadyActive => {
                log::warn!("Subscription already active");
                (
                    actix_web::http::StatusCode::CONFLICT,
                    "ALREADY_ACTIVE",
                    self.to_string(),
                )
            }
            AppError::OverlapExists => {
                log::warn!("Subscription period overlaps an existing one");
                (
                    actix_web::http::StatusCode::CONFLICT,
                    "OVERLAP_EXISTS",
                    self.to_string(),
                )
            }
            AppError::InvalidTransition(msg) => {
                log::warn!("Invalid transition: {msg}");
                (
                    actix_web::http::StatusCode::CONFLICT,
                    "INVALID_TRANSITION",
                    msg.clone(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_domain_errors_map_to_specific_statuses() {
        assert_eq!(
            AppError::NotFound("x".into()).error_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::AlreadyActive.error_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::OverlapExists.error_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InvalidTransition("x".into())
                .error_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ValidationError("x".into())
                .error_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_infrastructure_errors_are_opaque() {
        let err = AppError::DatabaseError(sea_orm::DbErr::Custom("connection reset".into()));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::InternalError("boom".into())
                .error_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
