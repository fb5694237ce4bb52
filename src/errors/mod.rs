use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("trap not found")]
    NotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("template rendering failed")]
    Render(#[from] handlebars::RenderError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::DuplicateKey(db_err.message().to_owned());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::ForeignKeyViolation(db_err.message().to_owned());
            }
        }
        AppError::Database(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Database(err) => {
                tracing::error!(error = ?err, "database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_owned(),
                )
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Trap not found".to_owned(),
            ),
            AppError::DuplicateKey(message) => {
                tracing::warn!(message, "duplicate key");
                (
                    StatusCode::CONFLICT,
                    "duplicate_key",
                    "Resource already exists".to_owned(),
                )
            }
            AppError::ForeignKeyViolation(message) => {
                tracing::error!(message, "foreign key violation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_owned(),
                )
            }
            AppError::Internal(message) => {
                tracing::error!(message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    message.to_owned(),
                )
            }
            AppError::Render(err) => {
                tracing::error!(error = ?err, "template rendering failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "render_error",
                    "Failed to render page".to_owned(),
                )
            }
        };

        (status, Json(ErrorBody { error: msg, code })).into_response()
    }
}
