//! NewType wrappers for the identifiers that flow through the desk.
//!
//! Usernames, permission strings and the various uuids are all plain text on
//! the wire; wrapping them keeps a tenant uuid from being passed where an
//! incident uuid is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Login name of a tenant. This is the `sub` claim of every token.
    Username
);

newtype_string!(
    /// A granted capability such as `incident.get`.
    ///
    /// The vocabulary is open: tenants may carry role strings the desk does
    /// not know about. Only membership matters.
    Permission
);

newtype_string!(
    /// Public identifier of an incident.
    IncidentUuid
);

newtype_string!(
    /// Public identifier of a tenant.
    TenantUuid
);

newtype_string!(
    /// Public identifier of an agent (a user incidents get assigned to).
    AgentUuid
);

impl IncidentUuid {
    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl TenantUuid {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl AgentUuid {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
