//! Request-scoped identity.

use std::collections::HashSet;

use axum::extract::FromRequestParts;
use http::request::Parts;

use crate::auth::error::AuthError;
use crate::types::{Permission, Username};

/// The authenticated caller of one request and what it may do.
///
/// Built by the gate from a validated token and placed in the request's
/// extensions. It is immutable once created and dropped with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: Username,
    permissions: HashSet<Permission>,
}

impl Principal {
    pub fn new(subject: Username, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            subject,
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn subject(&self) -> &Username {
        &self.subject
    }

    pub fn permissions(&self) -> &HashSet<Permission> {
        &self.permissions
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Handlers behind the gate take `Principal` as an argument.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}
