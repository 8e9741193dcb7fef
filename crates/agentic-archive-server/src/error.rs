//! Mapping of pipeline errors onto HTTP responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use agentic_archive::{ArchiveError, ErrorKind};

/// An [`ArchiveError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub ArchiveError);

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ExtractionFailure | ErrorKind::Timeout | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn title(&self) -> &'static str {
        match self.0.kind() {
            ErrorKind::ValidationError => "Invalid request",
            ErrorKind::RateLimitExceeded => "Rate limit exceeded",
            ErrorKind::UpstreamUnavailable => "Archive service unavailable",
            ErrorKind::ExtractionFailure => "Failed to extract archive metadata",
            ErrorKind::Timeout => "Archive task timed out",
            ErrorKind::Internal => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "error": self.title(),
            "kind": self.0.kind(),
            "details": self.0.to_string(),
        });
        if let Some(stage) = self.0.stage() {
            body["stage"] = serde_json::json!(stage);
        }

        let retry_after = match &self.0 {
            ArchiveError::RateLimited { retry_after } => Some(retry_after.as_secs()),
            _ => None,
        };
        if let Some(secs) = retry_after {
            body["retryAfter"] = serde_json::json!(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_archive::Stage;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ArchiveError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                ArchiveError::RateLimited {
                    retry_after: Duration::from_secs(60),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ArchiveError::UpstreamUnavailable {
                    stage: Stage::Submitting,
                    attempts: 3,
                    last_error: "HTTP 502".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ArchiveError::Extraction {
                    archive_id: "a".into(),
                    reason: "r".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ArchiveError::Timeout {
                    stage: Stage::Fetching,
                    elapsed: Duration::from_secs(3600),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_retry_after_header() {
        let response = ApiError(ArchiveError::RateLimited {
            retry_after: Duration::from_secs(60),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "60"
        );
    }
}
