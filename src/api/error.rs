// src/api/error.rs
use serde_json::json;
use shuttle_axum::axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::error::{OverrideError, PipelineError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Override(#[from] OverrideError),
}

impl ApiError {
    pub fn resort_not_found(slug: &str) -> Self {
        Self::NotFound(format!("resort `{slug}`"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::AlreadyRunning) => StatusCode::CONFLICT,
            Self::Override(OverrideError::VersionConflict { .. }) => StatusCode::CONFLICT,
            Self::Override(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(target: "api", "invalid admin key attempt");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status() {
        assert_eq!(
            ApiError::from(PipelineError::AlreadyRunning).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(OverrideError::InvalidDepth(0.0)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::resort_not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
