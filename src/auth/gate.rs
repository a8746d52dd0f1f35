//! Per-request authentication gate.
//!
//! Every request passes through `auth_middleware`. Requests under a public
//! prefix go straight through. Everything else needs a valid bearer token
//! whose subject still exists; the resulting `Principal` is attached to the
//! request for handlers to extract.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::context::Principal;
use crate::auth::error::AuthError;
use crate::auth::token::TokenService;
use crate::store::IdentityStore;

pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &[
    "/health",
    "/v1/login",
    "/v1/tenants",
    "/v1/users",
    "/swagger-ui",
    "/v3/api-docs",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Path prefixes reachable without a token. Matching is per segment:
    /// `/v1/users` covers `/v1/users/42` but not `/v1/usersettings`.
    pub public_prefixes: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            public_prefixes: DEFAULT_PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl GateConfig {
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Public path; no identity attached.
    Bypass,
    Authenticated(Principal),
}

#[derive(Clone)]
pub struct AuthGate {
    config: Arc<GateConfig>,
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
}

impl AuthGate {
    pub fn new(config: GateConfig, tokens: Arc<TokenService>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            config: Arc::new(config),
            tokens,
            identities,
        }
    }

    /// Decide what happens to a request for `path`.
    ///
    /// Only the three client-facing failures survive unchanged; anything
    /// unexpected becomes `AuthError::Internal`, which callers see as a
    /// generic 401.
    pub async fn evaluate(&self, path: &str, authorization: Option<&str>) -> Result<GateOutcome, AuthError> {
        if self.config.is_public(path) {
            debug!(path, "public path, skipping authentication");
            return Ok(GateOutcome::Bypass);
        }

        match self.authenticate(authorization).await {
            Ok(principal) => {
                debug!(path, subject = %principal.subject(), "request authenticated");
                Ok(GateOutcome::Authenticated(principal))
            }
            Err(err) => {
                warn!(path, reason = %err, "request rejected");
                Err(match err {
                    AuthError::MissingToken
                    | AuthError::MalformedToken(_)
                    | AuthError::InvalidToken(_)
                    | AuthError::UnknownSubject => err,
                    other => AuthError::Internal(other.to_string()),
                })
            }
        }
    }

    async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization).ok_or(AuthError::MissingToken)?;

        let subject = self.tokens.extract_subject(token)?;
        let identity = self
            .identities
            .find_by_username(&subject)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or(AuthError::UnknownSubject)?;

        let claims = self
            .tokens
            .check(token, &identity.username)
            .map_err(AuthError::InvalidToken)?;
        debug!(
            subject = %identity.username,
            issued_at = ?claims.issued_at(),
            expires_at = ?claims.expires_at(),
            "token accepted"
        );

        Ok(Principal::new(identity.username, claims.roles()))
    }
}

/// The token from `Bearer <token>`, if the header has that form.
fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let (scheme, token) = authorization?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Axum middleware running the gate in front of every route.
pub async fn auth_middleware(State(gate): State<AuthGate>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let authorization = match request.headers().get(AUTHORIZATION).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value.to_string()),
        Some(Err(_)) if gate.config.is_public(&path) => None,
        Some(Err(_)) => {
            warn!(path = %path, "authorization header is not valid text");
            return AuthError::Internal("unreadable authorization header".to_string()).into_response();
        }
    };

    match gate.evaluate(&path, authorization.as_deref()).await {
        Ok(GateOutcome::Bypass) => next.run(request).await,
        Ok(GateOutcome::Authenticated(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
