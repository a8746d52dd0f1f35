//! Tenant and agent registration.
//!
//! Tenants are the identities that log in. Their passwords are hashed with
//! bcrypt before they reach storage. A SOC tenant holds every incident
//! permission and cannot be deleted.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::policy::{INCIDENT_CREATE, INCIDENT_DELETE, INCIDENT_GET, INCIDENT_UPDATE};
use crate::db::{AgentCreate, AgentRecord, TenantCreate, TenantRecord};
use crate::incident::{Page, PageRequest};
use crate::store::{AgentStore, IncidentStore, StoreError, TenantStore};
use crate::types::{AgentUuid, TenantUuid, Username};

#[derive(Debug, Clone)]
pub enum DirectoryError {
    NotFound(String),
    AlreadyExists(String),
    InvalidData(String),
    SocTenant,
    OpenIncidents,
    Store(StoreError),
    Hashing(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{} not found", what),
            Self::AlreadyExists(what) => write!(f, "{} already exists", what),
            Self::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            Self::SocTenant => write!(f, "Cannot delete a SOC Tenant."),
            Self::OpenIncidents => write!(f, "Cannot delete a Tenant with open incidents"),
            Self::Store(err) => write!(f, "{}", err),
            Self::Hashing(msg) => write!(f, "Password hashing failed: {}", msg),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::AlreadyExists(msg),
            other => Self::Store(other),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "parent_soc_tenant_id")]
    pub parent_soc_tenant_id: Option<String>,
    pub username: String,
    pub password: String,
    /// Space or comma delimited permissions.
    #[serde(default)]
    pub roles: String,
}

impl fmt::Debug for NewTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewTenant")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub username: String,
    pub email: String,
    #[serde(alias = "first_name")]
    pub first_name: String,
    #[serde(alias = "last_name")]
    pub last_name: String,
    pub tenant: TenantUuid,
}

/// Fields of a tenant that may change after registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub username: Option<String>,
    pub roles: Option<String>,
}

impl TenantPatch {
    fn apply(self, record: &mut TenantRecord) -> Result<(), DirectoryError> {
        if let Some(name) = self.name {
            record.name = require(&name, "name")?;
        }
        if let Some(description) = self.description {
            record.description = Some(description);
        }
        if let Some(username) = self.username {
            record.username = Username::new(require(&username, "username")?);
        }
        if let Some(roles) = self.roles {
            record.roles = roles.trim().to_string();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(alias = "last_name")]
    pub last_name: Option<String>,
}

impl AgentPatch {
    fn apply(self, record: &mut AgentRecord) -> Result<(), DirectoryError> {
        if let Some(username) = self.username {
            record.username = Username::new(require(&username, "username")?);
        }
        if let Some(email) = self.email {
            record.email = require_email(&email)?;
        }
        if let Some(first_name) = self.first_name {
            record.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = self.last_name {
            record.last_name = last_name.trim().to_string();
        }
        Ok(())
    }
}

/// True when `roles` grants every incident permission.
pub fn is_soc_roles(roles: &str) -> bool {
    let granted: HashSet<&str> = roles
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|r| !r.is_empty())
        .collect();
    [INCIDENT_GET, INCIDENT_CREATE, INCIDENT_UPDATE, INCIDENT_DELETE]
        .iter()
        .all(|p| granted.contains(p))
}

fn require_email(value: &str) -> Result<String, DirectoryError> {
    let email = require(value, "email")?;
    if !email.contains('@') {
        return Err(DirectoryError::InvalidData(format!("{} is not an email address", email)));
    }
    Ok(email)
}

fn require(value: &str, field: &str) -> Result<String, DirectoryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::InvalidData(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct DirectoryService {
    tenants: Arc<dyn TenantStore>,
    agents: Arc<dyn AgentStore>,
    incidents: Arc<dyn IncidentStore>,
    bcrypt_cost: u32,
}

impl DirectoryService {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        agents: Arc<dyn AgentStore>,
        incidents: Arc<dyn IncidentStore>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            tenants,
            agents,
            incidents,
            bcrypt_cost,
        }
    }

    pub async fn register_tenant(&self, tenant: NewTenant) -> Result<TenantRecord, DirectoryError> {
        let name = require(&tenant.name, "name")?;
        let username = Username::new(require(&tenant.username, "username")?);
        if tenant.password.is_empty() {
            return Err(DirectoryError::InvalidData("password is required".to_string()));
        }

        if self.tenants.exists_by_username(&username).await? {
            warn!(username = %username, "tenant username already taken");
            return Err(DirectoryError::AlreadyExists(format!("Tenant {}", username)));
        }

        let cost = self.bcrypt_cost;
        let password = tenant.password;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| DirectoryError::Hashing(e.to_string()))?
            .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        let create = TenantCreate {
            uuid: TenantUuid::generate(),
            name,
            description: tenant.description,
            parent_soc_tenant_id: tenant.parent_soc_tenant_id,
            username,
            password_hash,
            roles: tenant.roles.trim().to_string(),
        };

        let created = self.tenants.insert_tenant(&create).await?;
        info!(tenant = %created.uuid, username = %created.username, "tenant registered");
        Ok(created)
    }

    pub async fn get_tenant(&self, uuid: &TenantUuid) -> Result<TenantRecord, DirectoryError> {
        self.tenants
            .find_tenant(uuid)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("Tenant {}", uuid)))
    }

    pub async fn list_tenants(&self, request: PageRequest) -> Result<Page<TenantRecord>, DirectoryError> {
        let (items, total) = self.tenants.page_tenants(request.offset(), request.size()).await?;
        Ok(Page::new(items, request, total))
    }

    pub async fn update_tenant(
        &self,
        uuid: &TenantUuid,
        patch: TenantPatch,
    ) -> Result<TenantRecord, DirectoryError> {
        let mut record = self.get_tenant(uuid).await?;
        let previous = record.username.clone();
        patch.apply(&mut record)?;

        if record.username != previous && self.tenants.exists_by_username(&record.username).await? {
            warn!(username = %record.username, "tenant username already taken");
            return Err(DirectoryError::AlreadyExists(format!("Tenant {}", record.username)));
        }

        let saved = self.tenants.save_tenant(&record).await?;
        info!(tenant = %uuid, "tenant updated");
        Ok(saved)
    }

    /// Delete a tenant unless it is a SOC tenant or still has open incidents.
    /// Agents registered under the tenant are left in place.
    pub async fn delete_tenant(&self, uuid: &TenantUuid) -> Result<(), DirectoryError> {
        let record = self.get_tenant(uuid).await?;
        if is_soc_roles(&record.roles) {
            warn!(tenant = %uuid, "refusing to delete SOC tenant");
            return Err(DirectoryError::SocTenant);
        }
        if self.incidents.has_open_for_tenant(uuid).await? {
            return Err(DirectoryError::OpenIncidents);
        }

        if !self.tenants.delete_tenant(uuid).await? {
            return Err(DirectoryError::NotFound(format!("Tenant {}", uuid)));
        }
        info!(tenant = %uuid, "tenant deleted");
        Ok(())
    }

    pub async fn register_agent(&self, agent: NewAgent) -> Result<AgentRecord, DirectoryError> {
        let username = Username::new(require(&agent.username, "username")?);
        let email = require_email(&agent.email)?;

        if self.tenants.find_tenant(&agent.tenant).await?.is_none() {
            return Err(DirectoryError::NotFound(format!("Tenant {}", agent.tenant)));
        }
        if self.agents.agent_username_taken(&username).await? {
            return Err(DirectoryError::AlreadyExists(format!("User {}", username)));
        }

        let create = AgentCreate {
            uuid: AgentUuid::generate(),
            username,
            email,
            first_name: agent.first_name.trim().to_string(),
            last_name: agent.last_name.trim().to_string(),
            tenant: agent.tenant,
        };

        let created = self.agents.insert_agent(&create).await?;
        info!(agent = %created.uuid, tenant = %created.tenant, "user registered");
        Ok(created)
    }

    pub async fn get_agent(&self, uuid: &AgentUuid) -> Result<AgentRecord, DirectoryError> {
        self.agents
            .find_agent(uuid)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("User {}", uuid)))
    }

    pub async fn list_agents(&self, request: PageRequest) -> Result<Page<AgentRecord>, DirectoryError> {
        let (items, total) = self.agents.page_agents(request.offset(), request.size()).await?;
        Ok(Page::new(items, request, total))
    }

    pub async fn update_agent(
        &self,
        uuid: &AgentUuid,
        patch: AgentPatch,
    ) -> Result<AgentRecord, DirectoryError> {
        let mut record = self.get_agent(uuid).await?;
        let previous = record.username.clone();
        patch.apply(&mut record)?;

        if record.username != previous && self.agents.agent_username_taken(&record.username).await? {
            return Err(DirectoryError::AlreadyExists(format!("User {}", record.username)));
        }

        let saved = self.agents.save_agent(&record).await?;
        info!(agent = %uuid, "user updated");
        Ok(saved)
    }

    pub async fn delete_agent(&self, uuid: &AgentUuid) -> Result<(), DirectoryError> {
        if !self.agents.delete_agent(uuid).await? {
            return Err(DirectoryError::NotFound(format!("User {}", uuid)));
        }
        info!(agent = %uuid, "user deleted");
        Ok(())
    }
}
