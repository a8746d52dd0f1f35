//! Per-operation permission checks.

use tracing::warn;

use crate::auth::context::Principal;
use crate::auth::error::AuthError;

pub const INCIDENT_GET: &str = "incident.get";
pub const INCIDENT_CREATE: &str = "incident.create";
pub const INCIDENT_UPDATE: &str = "incident.update";
pub const INCIDENT_DELETE: &str = "incident.delete";

/// Incident operations that require a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    ListOpen,
    Create,
    Update,
    Delete,
    Resolve,
    Assign,
}

impl Operation {
    /// The permission string that gates this operation.
    pub fn required_permission(&self) -> &'static str {
        match self {
            Self::List | Self::Get | Self::ListOpen => INCIDENT_GET,
            Self::Create => INCIDENT_CREATE,
            Self::Update | Self::Resolve | Self::Assign => INCIDENT_UPDATE,
            Self::Delete => INCIDENT_DELETE,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::List => "get incidents",
            Self::Get => "get the incident",
            Self::ListOpen => "get the open incidents",
            Self::Create => "create an incident",
            Self::Update => "update the incident",
            Self::Delete => "delete the incident",
            Self::Resolve => "resolve the incident",
            Self::Assign => "assign a user to the incident",
        }
    }
}

/// Deny unless `permission` is in the principal's granted set.
pub fn require(principal: &Principal, permission: &str) -> Result<(), AuthError> {
    if principal.has_permission(permission) {
        return Ok(());
    }

    warn!(
        subject = %principal.subject(),
        permission,
        "permission denied"
    );
    Err(AuthError::Denied(format!(
        "Missing required permission: {}",
        permission
    )))
}

/// `require` for a named incident operation, with a message that says what
/// the caller tried to do.
pub fn authorize(principal: &Principal, operation: Operation) -> Result<(), AuthError> {
    require(principal, operation.required_permission()).map_err(|_| {
        AuthError::Denied(format!(
            "You need special permissions to {}.",
            operation.describe()
        ))
    })
}
