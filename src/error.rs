// Application error type and its conversion into HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

use crate::pet_api::ApiError;

#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    // Visitor must sign in; pages answer with a redirect to /login
    Unauthorized(String),
    NotFound(String),
    Template(askama::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<askama::Error> for AppError {
    fn from(error: askama::Error) -> Self {
        AppError::Template(error)
    }
}

// A 401 from the API has already signed the visitor out by the time it gets here
impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        if error.is_unauthorized() {
            AppError::Unauthorized(error.to_string())
        } else {
            AppError::InternalServerError(anyhow::Error::new(error))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    crate::pet_api::GENERIC_FAILURE.to_string(),
                )
            }
            AppError::Unauthorized(message) => {
                tracing::warn!("Unauthorized access attempt: {}", message);
                return Redirect::to("/login").into_response();
            }
            AppError::NotFound(what) => {
                tracing::info!("Not found: {}", what);
                (StatusCode::NOT_FOUND, "Страница не найдена".to_string())
            }
            AppError::Template(e) => {
                tracing::error!("Failed to render template: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, error_message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
