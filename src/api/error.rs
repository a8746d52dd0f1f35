use std::fmt;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tracing::error;

use crate::auth::AuthError;
use crate::directory::DirectoryError;
use crate::incident::{IncidentError, InvalidFilterPredicate};
use crate::store::StoreError;

const UNAVAILABLE_MESSAGE: &str = "Failed to connect to the database.";
const INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

/// Every way a handler can fail, mapped to one status code each.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    InvalidFilter(InvalidFilterPredicate),
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => err.status(),
            Self::InvalidFilter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{}", err),
            Self::InvalidFilter(err) => write!(f, "{}", err),
            Self::BadRequest(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => f.write_str(msg),
            Self::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::StoreUnavailable(detail) => Self::Unavailable(detail),
            other => Self::Auth(other),
        }
    }
}

impl From<InvalidFilterPredicate> for ApiError {
    fn from(err: InvalidFilterPredicate) -> Self {
        Self::InvalidFilter(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Unavailable(msg) => Self::Unavailable(msg),
            StoreError::Missing(msg) => Self::Internal(msg),
        }
    }
}

impl From<IncidentError> for ApiError {
    fn from(err: IncidentError) -> Self {
        match err {
            IncidentError::NotFound(_) => Self::NotFound(err.to_string()),
            IncidentError::InvalidData(_) => Self::BadRequest(err.to_string()),
            IncidentError::InvalidFilter(inner) => Self::InvalidFilter(inner),
            IncidentError::StillOpen(_) | IncidentError::AlreadyAssigned(_) => {
                Self::Conflict(err.to_string())
            }
            IncidentError::NoAgents => Self::NotFound(err.to_string()),
            IncidentError::Store(inner) => inner.into(),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(_) => Self::NotFound(err.to_string()),
            DirectoryError::AlreadyExists(_) | DirectoryError::OpenIncidents => {
                Self::Conflict(err.to_string())
            }
            DirectoryError::SocTenant => Self::Forbidden(err.to_string()),
            DirectoryError::InvalidData(_) => Self::BadRequest(err.to_string()),
            DirectoryError::Hashing(msg) => Self::Internal(msg),
            DirectoryError::Store(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Auth(err) => err.into_response(),
            Self::Unavailable(detail) => {
                error!(%detail, "storage unavailable");
                (status, UNAVAILABLE_MESSAGE).into_response()
            }
            Self::Internal(detail) => {
                error!(%detail, "request failed");
                (status, INTERNAL_MESSAGE).into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}
