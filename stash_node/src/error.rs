use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stash_core::StashError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Stash(#[from] StashError),
    #[error("{message}")]
    Http { status: StatusCode, message: String },
}

/// JSON error envelope shared by every endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: u16,
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Folder creation reports sandbox violations as forbidden rather than
    /// as a bad request.
    pub fn forbidding_invalid_path(self) -> Self {
        match self {
            ApiError::Stash(err @ StashError::InvalidPath(_)) => Self::Http {
                status: StatusCode::FORBIDDEN,
                message: err.to_string(),
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Stash(err) => match err {
                StashError::Unauthenticated => StatusCode::UNAUTHORIZED,
                StashError::NamespaceNotFound | StashError::NotFound(_) => StatusCode::NOT_FOUND,
                StashError::InvalidPath(_) | StashError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                StashError::Conflict(_) => StatusCode::CONFLICT,
                StashError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Stash(StashError::Internal { context, source }) = &self {
            tracing::error!(error = %source, "{context}");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Http {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Http {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
