//! Global error handling module for the Anime Catalog API
//!
//! This module provides a unified error type that handles all application errors
//! and converts them to appropriate HTTP responses with consistent JSON structure.
//! Client errors that the frontend reports to users also carry the
//! `X-animeCatalogApp-error` / `X-animeCatalogApp-params` headers.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::auth::AuthError;
use crate::db::{DbError, RepositoryError};
use crate::models::ApiError;
use crate::routes::headers::{ERROR_HEADER, PARAMS_HEADER};
use crate::service::ServiceError;

/// Entity name used in alerts about user accounts
pub const USER_MANAGEMENT: &str = "userManagement";

/// Application-wide error type that unifies all error sources
#[derive(Debug, Error)]
pub enum AppError {
    /// Database pool errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Query errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Authentication and authorization errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// User service errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad request the frontend reports with a translated alert
    #[error("Bad request: {message}")]
    BadRequestAlert {
        message: String,
        entity_name: String,
        error_key: String,
    },

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a bad request alert, e.g. `("Invalid id", "anime", "idnull")`
    pub fn bad_request_alert(
        message: impl Into<String>,
        entity_name: impl Into<String>,
        error_key: impl Into<String>,
    ) -> Self {
        AppError::BadRequestAlert {
            message: message.into(),
            entity_name: entity_name.into(),
            error_key: error_key.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Attach an entity name to repository constraint failures
    pub fn for_entity(self, entity_name: &str) -> Self {
        match self {
            AppError::Repository(RepositoryError::Constraint(detail)) => {
                tracing::debug!("Constraint violation on {}: {}", entity_name, detail);
                AppError::bad_request_alert(
                    "The request violates a data constraint",
                    entity_name,
                    "constraint",
                )
            }
            other => other,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::BadRequestAlert { .. } => StatusCode::BAD_REQUEST,

            AppError::Auth(auth_err) => auth_status(auth_err),

            AppError::Repository(repo_err) => repository_status(repo_err),

            AppError::Service(service_err) => match service_err {
                ServiceError::LoginAlreadyUsed
                | ServiceError::EmailAlreadyUsed
                | ServiceError::InvalidPassword => StatusCode::BAD_REQUEST,
                ServiceError::UserNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ServiceError::Repository(e) => repository_status(e),
                ServiceError::Auth(e) => auth_status(e),
            },

            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error key and entity name for the alert headers, if any
    pub fn alert(&self) -> Option<(&str, &str)> {
        match self {
            AppError::BadRequestAlert {
                entity_name,
                error_key,
                ..
            } => Some((error_key.as_str(), entity_name.as_str())),
            AppError::Service(ServiceError::LoginAlreadyUsed) => Some(("userexists", USER_MANAGEMENT)),
            AppError::Service(ServiceError::EmailAlreadyUsed) => Some(("emailexists", USER_MANAGEMENT)),
            AppError::Repository(RepositoryError::Constraint(_))
            | AppError::Service(ServiceError::Repository(RepositoryError::Constraint(_))) => {
                Some(("constraint", ""))
            }
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::BadRequestAlert { message, .. } => message.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),

            AppError::Auth(auth_err) => auth_message(auth_err),

            AppError::Repository(repo_err) => repository_message(repo_err),

            AppError::Service(service_err) => match service_err {
                ServiceError::Repository(e) => repository_message(e),
                ServiceError::Auth(e) => auth_message(e),
                ServiceError::UserNotFound(_) => "User could not be found".to_string(),
                other => other.to_string(),
            },

            AppError::Database(db_err) => match db_err {
                DbError::ConnectionError(_) => "Database connection error".to_string(),
                DbError::HealthCheckError(_) => "Database health check failed".to_string(),
            },
        }
    }
}

fn auth_status(auth_err: &AuthError) -> StatusCode {
    match auth_err {
        AuthError::InvalidCredentials
        | AuthError::UserNotActivated(_)
        | AuthError::TokenExpired
        | AuthError::InvalidToken
        | AuthError::MissingAuthHeader
        | AuthError::InvalidAuthHeaderFormat
        | AuthError::TokenVerificationError(_) => StatusCode::UNAUTHORIZED,
        AuthError::AccessDenied => StatusCode::FORBIDDEN,
        AuthError::HashingError(_) | AuthError::TokenGenerationError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_status(repo_err: &RepositoryError) -> StatusCode {
    match repo_err {
        RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
        RepositoryError::Constraint(_) | RepositoryError::InvalidSort(_) => StatusCode::BAD_REQUEST,
        RepositoryError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_message(auth_err: &AuthError) -> String {
    match auth_err {
        AuthError::InvalidCredentials => "Invalid login or password".to_string(),
        AuthError::UserNotActivated(login) => format!("User {} was not activated", login),
        AuthError::TokenExpired => "Token has expired, please login again".to_string(),
        AuthError::InvalidToken => "Invalid authentication token".to_string(),
        AuthError::MissingAuthHeader => "Authorization header is required".to_string(),
        AuthError::InvalidAuthHeaderFormat => {
            "Invalid authorization header format, expected 'Bearer <token>'".to_string()
        }
        AuthError::TokenVerificationError(_) => "Invalid authentication token".to_string(),
        AuthError::AccessDenied => "Access is denied".to_string(),
        AuthError::HashingError(_) => "Authentication processing error".to_string(),
        AuthError::TokenGenerationError(_) => "Failed to generate authentication token".to_string(),
    }
}

fn repository_message(repo_err: &RepositoryError) -> String {
    match repo_err {
        RepositoryError::NotFound(what) => format!("Not found: {}", what),
        RepositoryError::Constraint(_) => "The request violates a data constraint".to_string(),
        RepositoryError::InvalidSort(property) => format!("Cannot sort by property '{}'", property),
        RepositoryError::DatabaseError(_) => "Database operation failed".to_string(),
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let mut builder = HttpResponse::build(status);
        if let Some((key, entity)) = self.alert() {
            builder.insert_header((ERROR_HEADER, format!("error.{}", key)));
            if !entity.is_empty() {
                builder.insert_header((PARAMS_HEADER, entity.to_string()));
            }
        }

        builder.json(ApiError::new(self.user_message()))
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
