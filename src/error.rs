use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request input. User-correctable.
    #[error("{0}")]
    Validation(String),

    /// No matching record at some stage of a query. The message names the
    /// stage.
    #[error("{0}")]
    NotFound(String),

    /// An external collaborator (extractor source, routing, synthesizer)
    /// failed.
    #[error("{service} request failed")]
    Upstream {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Persistent store failure. Fatal to the current operation.
    #[error("store error")]
    Store(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(service: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::Upstream { service, source: err.into() }
    }
}

impl From<jiff::Error> for AppError {
    fn from(err: jiff::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Internal detail stays in the logs, never in the response body.
            _ => {
                tracing::error!(error = ?self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            },
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
