//! Username/password login over HTTP Basic.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, warn};

use crate::auth::error::AuthError;
use crate::auth::token::TokenService;
use crate::store::{Identity, IdentityStore};
use crate::types::Username;

/// Decoded `Authorization: Basic` credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: Username,
    password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<Username>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Parse a `Basic base64(username:password)` header value.
///
/// The split happens at the first `:` so passwords may contain colons.
pub fn parse_basic(header: &str) -> Result<BasicCredentials, AuthError> {
    let (scheme, encoded) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::AuthenticationFailed)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::AuthenticationFailed);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::AuthenticationFailed)?;
    let text = String::from_utf8(decoded).map_err(|_| AuthError::AuthenticationFailed)?;

    let (username, password) = text
        .split_once(':')
        .ok_or(AuthError::AuthenticationFailed)?;
    if username.is_empty() {
        return Err(AuthError::AuthenticationFailed);
    }

    Ok(BasicCredentials::new(username, password))
}

/// Checks credentials against the identity store and issues tokens.
#[derive(Clone)]
pub struct CredentialAuthenticator {
    identities: Arc<dyn IdentityStore>,
    tokens: Arc<TokenService>,
}

impl CredentialAuthenticator {
    pub fn new(identities: Arc<dyn IdentityStore>, tokens: Arc<TokenService>) -> Self {
        Self { identities, tokens }
    }

    /// Resolve the identity and verify the password against its bcrypt hash.
    pub async fn authenticate(&self, credentials: &BasicCredentials) -> Result<Identity, AuthError> {
        let identity = self
            .identities
            .find_by_username(&credentials.username)
            .await
            .map_err(|e| AuthError::StoreUnavailable(e.to_string()))?;

        let Some(identity) = identity else {
            warn!(username = %credentials.username, "login for unknown tenant");
            return Err(AuthError::AuthenticationFailed);
        };

        let password = credentials.password.clone();
        let hash = identity.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .unwrap_or(false);

        if !matches {
            warn!(username = %credentials.username, "login with wrong password");
            return Err(AuthError::AuthenticationFailed);
        }

        Ok(identity)
    }

    /// Authenticate a Basic header and return a bearer token for the tenant.
    pub async fn login(&self, authorization: Option<&str>) -> Result<String, AuthError> {
        let header = authorization.ok_or(AuthError::AuthenticationFailed)?;
        let credentials = parse_basic(header)?;
        let identity = self.authenticate(&credentials).await?;

        let token = self
            .tokens
            .issue(&identity.username, &identity.permission_string());
        info!(username = %identity.username, "issued token");
        Ok(token)
    }
}
