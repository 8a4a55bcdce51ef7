use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{cache::CacheError, domain::error::DomainError, infra::error::InfraError};

const INTERNAL_SERVER_ERROR: &str = "internal_server_error";

/// Diagnostic chain of a failed request, carried in response extensions
/// so the logging middleware can record what the client never sees.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub chain: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let chain = std::iter::successors(Some(error), |current| (*current).source())
            .map(ToString::to_string)
            .collect();
        Self { chain }
    }
}

/// JSON error envelope: `{"error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Validation { .. }) => StatusCode::BAD_REQUEST,
            AppError::Infra(_) | AppError::Cache(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to API clients; faults never leak details.
    fn presentation_message(&self) -> String {
        match self {
            AppError::Domain(err) => err.to_string(),
            AppError::Infra(_) | AppError::Cache(_) | AppError::Unexpected(_) => {
                INTERNAL_SERVER_ERROR.to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.presentation_message(),
        };
        let report = ErrorReport::from_error(&self);
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
