use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::keygen::GenerateError;
use crate::models::ValidationError;
use crate::storage::StoreError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("404: Wrong url or deleted.")]
    NotFound,
    #[error("store unavailable")]
    StoreUnavailable {
        #[from]
        source: StoreError,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("error reading multipart data")]
    Multipart {
        #[from]
        source: MultipartError,
    },
}

impl From<GenerateError> for ApiError {
    fn from(source: GenerateError) -> Self {
        match source {
            GenerateError::Store { source } => ApiError::StoreUnavailable { source },
            GenerateError::Cancelled => ApiError::Cancelled,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable { source } => {
                error!("store error: {source}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
                    .into_response();
            }
            ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart { .. } => StatusCode::BAD_REQUEST,
        };

        (status_code, format!("{self}")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn statuses() {
        assert_eq!(
            status(ValidationError::EmptyBody.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(ApiError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(ApiError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
        let store = StoreError::Corrupt {
            key: "paste:abcd".to_owned(),
            field: "Size",
        };
        assert_eq!(status(store.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_messages_are_verbatim() {
        let error = ApiError::from(ValidationError::TitleTooLong);
        assert_eq!(
            error.to_string(),
            "Title can not be longer than 50 characters."
        );
    }

    #[test]
    fn generate_errors_keep_their_meaning() {
        assert!(matches!(
            ApiError::from(GenerateError::Cancelled),
            ApiError::Cancelled
        ));
        let store = StoreError::Corrupt {
            key: "paste:abcd".to_owned(),
            field: "Size",
        };
        assert!(matches!(
            ApiError::from(GenerateError::from(store)),
            ApiError::StoreUnavailable { .. }
        ));
    }
}
