//! Mapping of core errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sentiment_core::SentimentError;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
pub struct ApiError(pub SentimentError);

impl From<SentimentError> for ApiError {
    fn from(value: SentimentError) -> Self {
        ApiError(value)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            SentimentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Prediction failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let status = |e: SentimentError| ApiError(e).status();
        assert_eq!(
            status(SentimentError::Tokenization("bad bytes".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(SentimentError::Timeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(SentimentError::Inference("nan".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(SentimentError::Worker("panicked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
