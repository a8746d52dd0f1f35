//! Authentication and authorization errors.

use std::fmt;

use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Why a bearer token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Wrong segment count, bad base64, bad JSON, or an unsupported header.
    Malformed,
    /// The MAC over `header.payload` does not verify.
    Signature,
    /// The `sub` claim is absent or names someone else.
    Subject,
    /// `exp` lies in the past.
    Expired,
}

impl TokenRejection {
    /// Short reason code used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Signature => "signature",
            Self::Subject => "subject",
            Self::Expired => "expiry",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed body for a protected request that carries no bearer token.
pub const NO_TOKEN_MESSAGE: &str = "Unauthorized: No JWT token found";
/// Fixed body for a bearer token that fails validation.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid JWT token";
/// Generic body for anything else that goes wrong while authenticating.
pub const GENERIC_AUTH_MESSAGE: &str = "Unauthorized: Authentication error";
/// Body for a login the identity store could not serve.
pub const STORE_UNAVAILABLE_MESSAGE: &str = "Failed to connect to the database.";

/// Authentication and authorization errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Protected route reached without `Authorization: Bearer`.
    MissingToken,
    /// Token could not be split or decoded.
    MalformedToken(String),
    /// Token decoded but failed validation.
    InvalidToken(TokenRejection),
    /// Token names a subject the identity store does not know.
    UnknownSubject,
    /// Basic-auth credentials did not match.
    AuthenticationFailed,
    /// Authenticated, but the principal lacks the required permission.
    Denied(String),
    /// The token machinery itself is unusable (e.g. empty secret).
    Misconfigured(String),
    /// The identity store could not answer a login.
    StoreUnavailable(String),
    /// Anything else, including identity store failures.
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Denied(_) => StatusCode::FORBIDDEN,
            Self::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Text that is safe to hand to an unauthenticated caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::MissingToken => NO_TOKEN_MESSAGE.to_string(),
            Self::MalformedToken(_) | Self::InvalidToken(_) => INVALID_TOKEN_MESSAGE.to_string(),
            Self::AuthenticationFailed => "Invalid username or password".to_string(),
            Self::Denied(msg) => msg.clone(),
            Self::StoreUnavailable(_) => STORE_UNAVAILABLE_MESSAGE.to_string(),
            Self::UnknownSubject | Self::Misconfigured(_) | Self::Internal(_) => {
                GENERIC_AUTH_MESSAGE.to_string()
            }
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "{}", NO_TOKEN_MESSAGE),
            Self::MalformedToken(msg) => write!(f, "Malformed token: {}", msg),
            Self::InvalidToken(reason) => write!(f, "Invalid token: {}", reason),
            Self::UnknownSubject => write!(f, "Token subject is not a known identity"),
            Self::AuthenticationFailed => write!(f, "Invalid username or password"),
            Self::Denied(msg) => write!(f, "Access denied: {}", msg),
            Self::Misconfigured(msg) => write!(f, "Token configuration error: {}", msg),
            Self::StoreUnavailable(msg) => write!(f, "Identity store unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Authentication error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidToken(TokenRejection::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AuthenticationFailed.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Denied("nope".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::Internal("boom".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = AuthError::Internal("connection refused at 10.0.0.3".to_string());
        assert_eq!(err.public_message(), GENERIC_AUTH_MESSAGE);

        let err = AuthError::MalformedToken("base64 at offset 4".to_string());
        assert_eq!(err.public_message(), INVALID_TOKEN_MESSAGE);
    }

    #[test]
    fn test_rejection_reason_codes() {
        assert_eq!(TokenRejection::Malformed.as_str(), "malformed");
        assert_eq!(TokenRejection::Signature.as_str(), "signature");
        assert_eq!(TokenRejection::Subject.as_str(), "subject");
        assert_eq!(TokenRejection::Expired.as_str(), "expiry");
    }
}
