//! Storage collaborator interfaces.
//!
//! The auth core and the incident operations only ever talk to storage
//! through these traits. `db::SurrealStore` is the shipped implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::db::{AgentCreate, AgentRecord, IncidentRecord, IncidentCreate, TenantCreate, TenantRecord};
use crate::incident::IncidentFilter;
use crate::model::State;
use crate::types::{AgentUuid, IncidentUuid, TenantUuid, Username};

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Failures reported by a storage collaborator.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The backend could not be reached or refused the query.
    Unavailable(String),
    /// A uniqueness constraint rejected the write.
    Conflict(String),
    /// A write reported success but returned nothing.
    Missing(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Self::Conflict(msg) => write!(f, "Storage conflict: {}", msg),
            Self::Missing(msg) => write!(f, "Storage returned no record: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        match &err {
            surrealdb::Error::Db(
                surrealdb::error::Db::IndexExists { .. } | surrealdb::error::Db::RecordExists { .. },
            ) => Self::Conflict(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

/// What the identity store knows about a login.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: Username,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Granted permissions as stored, space or comma delimited.
    pub permissions: String,
}

impl Identity {
    /// Permissions normalised to the space-delimited form tokens carry.
    pub fn permission_string(&self) -> String {
        self.permissions
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

pub trait IdentityStore: Send + Sync {
    fn find_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, Option<Identity>>;

    fn exists_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, bool>;
}

pub trait TenantStore: IdentityStore {
    fn insert_tenant<'a>(&'a self, tenant: &'a TenantCreate) -> StoreFuture<'a, TenantRecord>;

    fn find_tenant<'a>(&'a self, uuid: &'a TenantUuid) -> StoreFuture<'a, Option<TenantRecord>>;

    /// One page of tenants ordered by name, plus the total tenant count.
    fn page_tenants(&self, offset: u64, limit: u64) -> StoreFuture<'_, (Vec<TenantRecord>, u64)>;

    /// Persist name, description, username and roles of an existing tenant.
    fn save_tenant<'a>(&'a self, tenant: &'a TenantRecord) -> StoreFuture<'a, TenantRecord>;

    /// Returns whether a record was removed.
    fn delete_tenant<'a>(&'a self, uuid: &'a TenantUuid) -> StoreFuture<'a, bool>;
}

pub trait AgentStore: Send + Sync {
    fn insert_agent<'a>(&'a self, agent: &'a AgentCreate) -> StoreFuture<'a, AgentRecord>;

    fn find_agent<'a>(&'a self, uuid: &'a AgentUuid) -> StoreFuture<'a, Option<AgentRecord>>;

    fn agent_username_taken<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, bool>;

    /// Snapshot of every agent.
    fn list_agents(&self) -> StoreFuture<'_, Vec<AgentRecord>>;

    /// One page of agents ordered by username, plus the total agent count.
    fn page_agents(&self, offset: u64, limit: u64) -> StoreFuture<'_, (Vec<AgentRecord>, u64)>;

    /// Persist username, email and names of an existing agent.
    fn save_agent<'a>(&'a self, agent: &'a AgentRecord) -> StoreFuture<'a, AgentRecord>;

    fn delete_agent<'a>(&'a self, uuid: &'a AgentUuid) -> StoreFuture<'a, bool>;
}

pub trait IncidentStore: Send + Sync {
    /// One page of incidents matching every predicate of `filter`, plus the
    /// number of matches across all pages.
    ///
    /// Ordering is stable: the same arguments return the same slice.
    fn page<'a>(
        &'a self,
        filter: &'a IncidentFilter,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, (Vec<IncidentRecord>, u64)>;

    fn find_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, Option<IncidentRecord>>;

    fn list_by_state(&self, state: State) -> StoreFuture<'_, Vec<IncidentRecord>>;

    /// Whether `tenant` reported any incident that is still `Open`.
    fn has_open_for_tenant<'a>(&'a self, tenant: &'a TenantUuid) -> StoreFuture<'a, bool>;

    fn insert_incident<'a>(&'a self, incident: &'a IncidentCreate) -> StoreFuture<'a, IncidentRecord>;

    /// Persist the mutable fields of an existing incident.
    fn save_incident<'a>(&'a self, incident: &'a IncidentRecord) -> StoreFuture<'a, IncidentRecord>;

    /// Set the assignee only if the incident has none. `None` when the
    /// incident is missing or already assigned.
    fn assign_if_unassigned<'a>(
        &'a self,
        uuid: &'a IncidentUuid,
        agent: &'a AgentUuid,
    ) -> StoreFuture<'a, Option<IncidentRecord>>;

    /// Close the incident and stamp its resolution time.
    fn resolve_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, Option<IncidentRecord>>;

    /// Returns whether a record was removed.
    fn delete_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(perms: &str) -> Identity {
        Identity {
            username: Username::new("soc"),
            password_hash: "$2b$04$abcdefghijklmnopqrstuv".to_string(),
            permissions: perms.to_string(),
        }
    }

    #[test]
    fn test_permission_string_normalises_delimiters() {
        assert_eq!(
            identity("incident.get,incident.create").permission_string(),
            "incident.get incident.create"
        );
        assert_eq!(
            identity(" incident.get ,  incident.delete ").permission_string(),
            "incident.get incident.delete"
        );
        assert_eq!(identity("").permission_string(), "");
    }

    #[test]
    fn test_identity_debug_hides_hash() {
        let rendered = format!("{:?}", identity("incident.get"));
        assert!(!rendered.contains("$2b$"));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Unavailable("down".to_string()).to_string(),
            "Storage unavailable: down"
        );
    }
}
