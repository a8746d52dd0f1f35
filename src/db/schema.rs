use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::model::{Priority, Severity, State};
use crate::types::{AgentUuid, IncidentUuid, TenantUuid, Username};

/// Persisted tenant (table: `tenant`).
///
/// Tenants are the organisations that report incidents. They are also the
/// identities that log in, so the record carries the bcrypt hash and the
/// granted roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: RecordId,
    pub uuid: TenantUuid,
    pub name: String,
    pub description: Option<String>,
    /// Uuid of the SOC tenant that supervises this one, if any.
    pub parent_soc_tenant_id: Option<String>,
    pub username: Username,
    /// bcrypt hash, never the plain password.
    pub password: String,
    /// Space or comma delimited permission strings.
    pub roles: String,
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCreate {
    pub uuid: TenantUuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_soc_tenant_id: Option<String>,
    pub username: Username,
    pub password_hash: String,
    pub roles: String,
}

/// An analyst that incidents get assigned to (table: `agent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: RecordId,
    pub uuid: AgentUuid,
    pub username: Username,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// The tenant this agent works for.
    pub tenant: TenantUuid,
    pub date_created: Option<Datetime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCreate {
    pub uuid: AgentUuid,
    pub username: Username,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tenant: TenantUuid,
}

/// Persisted incident (table: `incident`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: RecordId,
    pub uuid: IncidentUuid,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub state: State,
    pub device: Option<String>,
    pub location: Option<String>,
    pub priority: Priority,
    pub sha256: Option<String>,
    pub date_reported: Option<Datetime>,
    pub date_resolved: Option<Datetime>,
    pub reported_by_tenant: TenantUuid,
    pub assigned_to_user: Option<AgentUuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreate {
    pub uuid: IncidentUuid,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub state: State,
    pub device: Option<String>,
    pub location: Option<String>,
    pub priority: Priority,
    pub sha256: Option<String>,
    pub reported_by_tenant: TenantUuid,
    pub assigned_to_user: Option<AgentUuid>,
}

/// Row shape of `SELECT count() AS total ... GROUP ALL`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CountRow {
    pub total: u64,
}
