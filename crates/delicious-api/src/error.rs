//! Error type shared by every handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use delicious_db::SlugConflict;

use crate::photos::PhotoError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    /// Template failed to render.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<SlugConflict>() {
            Some(conflict) => Self::Conflict(conflict.to_string()),
            None => Self::Database(err),
        }
    }
}

impl From<PhotoError> for ApiError {
    fn from(err: PhotoError) -> Self {
        match err {
            PhotoError::Io(_) | PhotoError::Task(_) => Self::Internal(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Database(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(status_of(ApiError::NotFound("store".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ApiError::BadRequest("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::Conflict("taken".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ApiError::Database(anyhow::anyhow!("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn slug_conflicts_become_409() {
        let err: ApiError = anyhow::Error::new(SlugConflict {
            base: "pizza-place".into(),
            attempts: 8,
        })
        .into();
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn photo_errors_split_client_and_server() {
        assert!(matches!(ApiError::from(PhotoError::NotAnImage), ApiError::BadRequest(_)));
        assert_eq!(
            ApiError::from(PhotoError::NotAnImage).to_string(),
            "That filetype isn't allowed!"
        );
        assert!(matches!(
            ApiError::from(PhotoError::Task("join".into())),
            ApiError::Internal(_)
        ));
    }
}
