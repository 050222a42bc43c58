use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::validation::FieldErrors;

pub const GENERIC_FAILURE: &str = "Ошибка при подключении к серверу";
pub const DELETE_FORBIDDEN: &str = "Нельзя удалить объявление с текущим статусом";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered {status}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: Value,
    },

    #[error("malformed response from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response shape from {0}")]
    UnexpectedShape(String),

    #[error("invalid multipart field: {0}")]
    InvalidUpload(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn is_validation(&self) -> bool {
        self.status() == Some(StatusCode::UNPROCESSABLE_ENTITY)
    }

    /// Server-side validation errors (422), first message per field.
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let ApiError::Status { status, body, .. } = self else {
            return errors;
        };
        if *status != StatusCode::UNPROCESSABLE_ENTITY {
            return errors;
        }
        let Some(map) = body
            .pointer("/error/errors")
            .or_else(|| body.get("errors"))
            .and_then(Value::as_object)
        else {
            return errors;
        };
        for (field, messages) in map {
            let message = match messages {
                Value::Array(items) => items.first().and_then(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            };
            if let Some(message) = message {
                errors.insert(field.clone(), message.to_string());
            }
        }
        errors
    }

    /// Server-provided message, if any (`error.message` or `message`).
    pub fn server_message(&self) -> Option<&str> {
        let ApiError::Status { body, .. } = self else {
            return None;
        };
        body.pointer("/error/message")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
    }

    pub fn delete_message(&self) -> &'static str {
        if self.status() == Some(StatusCode::FORBIDDEN) {
            DELETE_FORBIDDEN
        } else {
            "Ошибка при удалении объявления"
        }
    }
}
