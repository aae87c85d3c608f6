use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::{Value, json};

use crate::domain::error::AccessError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of one request, rendered as a JSON body.
#[derive(Debug)]
pub enum ApiError {
    Access(AccessError),
    /// The request body is not a JSON document.
    MalformedBody(String),
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        Self::Access(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody(rejection.body_text())
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::Access(AccessError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Access(AccessError::Forbidden) => StatusCode::FORBIDDEN,
            Self::Access(AccessError::NotFound) => StatusCode::NOT_FOUND,
            Self::Access(AccessError::Store(_) | AccessError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Access(AccessError::NotFound) => json!({ "data": null }),
            Self::Access(e) => json!({ "error": e.public_message() }),
            Self::MalformedBody(text) => json!({ "error": text }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Details stay in the logs; the client only sees the public message.
            tracing::error!(error = ?self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use recordkit_schema::ValidationError;

    #[test]
    fn access_errors_map_to_status_and_body() {
        let cases = [
            (
                ApiError::from(AccessError::from(ValidationError::single("name", "required"))),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::from(AccessError::Forbidden), StatusCode::FORBIDDEN),
            (ApiError::from(AccessError::NotFound), StatusCode::NOT_FOUND),
            (
                ApiError::from(AccessError::Store(anyhow::anyhow!("disk full"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }

        assert_eq!(ApiError::from(AccessError::NotFound).body(), json!({"data": null}));
        assert_eq!(
            ApiError::from(AccessError::internal("boom")).body(),
            json!({"error": "Internal error"})
        );
    }
}
