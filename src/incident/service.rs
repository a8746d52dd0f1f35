//! Incident operations.
//!
//! The service assumes the caller has already been authorised for the
//! operation; it only enforces data and lifecycle rules.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use tracing::{debug, info};

use crate::db::{IncidentCreate, IncidentRecord};
use crate::incident::filter::{IncidentFilter, InvalidFilterPredicate, Page};
use crate::model::{Priority, Severity, State};
use crate::store::{AgentStore, IncidentStore, StoreError, TenantStore};
use crate::types::{AgentUuid, IncidentUuid, TenantUuid};

#[derive(Debug, Clone)]
pub enum IncidentError {
    NotFound(IncidentUuid),
    InvalidData(String),
    InvalidFilter(InvalidFilterPredicate),
    /// Open incidents must be resolved before they can be deleted.
    StillOpen(IncidentUuid),
    AlreadyAssigned(AgentUuid),
    NoAgents,
    Store(StoreError),
}

impl fmt::Display for IncidentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(uuid) => write!(f, "Incident not found: {}", uuid),
            Self::InvalidData(msg) => write!(f, "Incident data is invalid: {}", msg),
            Self::InvalidFilter(err) => write!(f, "{}", err),
            Self::StillOpen(uuid) => write!(
                f,
                "Incident {} is still open; resolve it before deleting",
                uuid
            ),
            Self::AlreadyAssigned(agent) => {
                write!(f, "Incident is already assigned to user {}", agent)
            }
            Self::NoAgents => write!(f, "No users are available for assignment"),
            Self::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for IncidentError {}

impl From<StoreError> for IncidentError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<InvalidFilterPredicate> for IncidentError {
    fn from(err: InvalidFilterPredicate) -> Self {
        Self::InvalidFilter(err)
    }
}

/// Body of an incident report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    #[serde(alias = "incident_type")]
    pub incident_type: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub state: Option<State>,
    pub priority: Option<Priority>,
    pub device: Option<String>,
    pub location: Option<String>,
    pub sha256: Option<String>,
    #[serde(alias = "reported_by_tenant")]
    pub reported_by_tenant: Option<TenantUuid>,
    #[serde(alias = "assigned_to_user")]
    pub assigned_to_user: Option<AgentUuid>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPatch {
    #[serde(alias = "incident_type")]
    pub incident_type: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub state: Option<State>,
    pub priority: Option<Priority>,
    pub device: Option<String>,
    pub location: Option<String>,
    pub sha256: Option<String>,
    #[serde(alias = "assigned_to_user")]
    pub assigned_to_user: Option<AgentUuid>,
    /// RFC 3339 timestamp.
    #[serde(alias = "date_resolved")]
    pub date_resolved: Option<DateTime<Utc>>,
}

impl IncidentPatch {
    fn apply(self, record: &mut IncidentRecord) {
        if let Some(incident_type) = self.incident_type {
            record.incident_type = incident_type;
        }
        if let Some(description) = self.description {
            record.description = description;
        }
        if let Some(severity) = self.severity {
            record.severity = severity;
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(device) = self.device {
            record.device = Some(device);
        }
        if let Some(location) = self.location {
            record.location = Some(location);
        }
        if let Some(sha256) = self.sha256 {
            record.sha256 = Some(sha256);
        }
        if let Some(agent) = self.assigned_to_user {
            record.assigned_to_user = Some(agent);
        }
        if let Some(resolved) = self.date_resolved {
            record.date_resolved = Some(resolved.into());
        }
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, IncidentError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(IncidentError::InvalidData(format!("{} is required", field))),
    }
}

#[derive(Clone)]
pub struct IncidentService {
    incidents: Arc<dyn IncidentStore>,
    tenants: Arc<dyn TenantStore>,
    agents: Arc<dyn AgentStore>,
}

impl IncidentService {
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        tenants: Arc<dyn TenantStore>,
        agents: Arc<dyn AgentStore>,
    ) -> Self {
        Self {
            incidents,
            tenants,
            agents,
        }
    }

    pub async fn list(&self, filter: &IncidentFilter) -> Result<Page<IncidentRecord>, IncidentError> {
        let request = filter.page;
        let (items, total) = self
            .incidents
            .page(filter, request.offset(), request.size())
            .await?;

        debug!(
            page = request.page(),
            size = request.size(),
            total,
            returned = items.len(),
            "listed incidents"
        );
        Ok(Page::new(items, request, total))
    }

    pub async fn get(&self, uuid: &IncidentUuid) -> Result<IncidentRecord, IncidentError> {
        self.incidents
            .find_incident(uuid)
            .await?
            .ok_or_else(|| IncidentError::NotFound(uuid.clone()))
    }

    pub async fn list_open(&self) -> Result<Vec<IncidentRecord>, IncidentError> {
        Ok(self.incidents.list_by_state(State::Open).await?)
    }

    pub async fn create(&self, report: NewIncident) -> Result<IncidentRecord, IncidentError> {
        let incident_type = required_text(report.incident_type, "incidentType")?;
        let description = required_text(report.description, "description")?;
        let severity = report
            .severity
            .ok_or_else(|| IncidentError::InvalidData("severity is required".to_string()))?;
        let priority = report
            .priority
            .ok_or_else(|| IncidentError::InvalidData("priority is required".to_string()))?;
        let tenant = report.reported_by_tenant.ok_or_else(|| {
            IncidentError::InvalidData("reportedByTenant is required".to_string())
        })?;

        if self.tenants.find_tenant(&tenant).await?.is_none() {
            return Err(IncidentError::InvalidData(format!(
                "reporting tenant {} does not exist",
                tenant
            )));
        }
        if let Some(agent) = &report.assigned_to_user {
            self.ensure_agent(agent).await?;
        }

        let create = IncidentCreate {
            uuid: IncidentUuid::generate(),
            incident_type,
            description,
            severity,
            state: report.state.unwrap_or(State::Open),
            device: report.device,
            location: report.location,
            priority,
            sha256: report.sha256,
            reported_by_tenant: tenant,
            assigned_to_user: report.assigned_to_user,
        };

        let created = self.incidents.insert_incident(&create).await?;
        info!(
            incident = %created.uuid,
            tenant = %created.reported_by_tenant,
            severity = %created.severity,
            "incident reported"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        uuid: &IncidentUuid,
        patch: IncidentPatch,
    ) -> Result<IncidentRecord, IncidentError> {
        if let Some(agent) = &patch.assigned_to_user {
            self.ensure_agent(agent).await?;
        }
        for (value, field) in [
            (&patch.incident_type, "incidentType"),
            (&patch.description, "description"),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(IncidentError::InvalidData(format!("{} must not be blank", field)));
            }
        }

        let mut record = self.get(uuid).await?;
        patch.apply(&mut record);

        let saved = self.incidents.save_incident(&record).await?;
        info!(incident = %saved.uuid, state = %saved.state, "incident updated");
        Ok(saved)
    }

    pub async fn delete(&self, uuid: &IncidentUuid) -> Result<(), IncidentError> {
        let record = self.get(uuid).await?;
        if record.state == State::Open {
            return Err(IncidentError::StillOpen(uuid.clone()));
        }

        if !self.incidents.delete_incident(uuid).await? {
            return Err(IncidentError::NotFound(uuid.clone()));
        }
        info!(incident = %uuid, "incident deleted");
        Ok(())
    }

    pub async fn resolve(&self, uuid: &IncidentUuid) -> Result<IncidentRecord, IncidentError> {
        let resolved = self
            .incidents
            .resolve_incident(uuid)
            .await?
            .ok_or_else(|| IncidentError::NotFound(uuid.clone()))?;
        info!(incident = %uuid, "incident resolved");
        Ok(resolved)
    }

    /// Assign a randomly chosen agent to an unassigned incident. The store
    /// only writes when the incident is still unassigned, so concurrent
    /// callers cannot overwrite each other.
    pub async fn assign(&self, uuid: &IncidentUuid) -> Result<IncidentRecord, IncidentError> {
        let record = self.get(uuid).await?;
        if let Some(agent) = record.assigned_to_user {
            return Err(IncidentError::AlreadyAssigned(agent));
        }

        let agents = self.agents.list_agents().await?;
        let chosen = agents
            .choose(&mut rand::rng())
            .map(|a| a.uuid.clone())
            .ok_or(IncidentError::NoAgents)?;

        match self.incidents.assign_if_unassigned(uuid, &chosen).await? {
            Some(saved) => {
                info!(incident = %uuid, agent = %chosen, "incident assigned");
                Ok(saved)
            }
            None => match self.get(uuid).await?.assigned_to_user {
                Some(winner) => {
                    debug!(incident = %uuid, agent = %winner, "lost assignment race");
                    Err(IncidentError::AlreadyAssigned(winner))
                }
                None => Err(IncidentError::NotFound(uuid.clone())),
            },
        }
    }

    async fn ensure_agent(&self, agent: &AgentUuid) -> Result<(), IncidentError> {
        match self.agents.find_agent(agent).await? {
            Some(_) => Ok(()),
            None => Err(IncidentError::InvalidData(format!(
                "user {} does not exist",
                agent
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        AgentCreate, DatabaseConfig, SurrealStore, TenantCreate, create_connection, ensure_schema,
    };
    use crate::incident::{IncidentFilterBuilder, PageRequest};
    use crate::types::Username;

    struct Fixture {
        service: IncidentService,
        store: Arc<SurrealStore>,
        tenant: TenantUuid,
    }

    async fn setup() -> Fixture {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        let store = Arc::new(SurrealStore::new(db));

        let tenant = store
            .insert_tenant(&TenantCreate {
                uuid: TenantUuid::generate(),
                name: "Acme".to_string(),
                description: None,
                parent_soc_tenant_id: None,
                username: Username::new("acme"),
                password_hash: "$2b$04$hash".to_string(),
                roles: "incident.get".to_string(),
            })
            .await
            .unwrap();

        let service = IncidentService::new(store.clone(), store.clone(), store.clone());
        Fixture {
            service,
            store,
            tenant: tenant.uuid,
        }
    }

    fn report(tenant: &TenantUuid) -> NewIncident {
        NewIncident {
            incident_type: Some("Malware".to_string()),
            description: Some("Trojan found".to_string()),
            severity: Some(Severity::High),
            priority: Some(Priority::High),
            reported_by_tenant: Some(tenant.clone()),
            ..Default::default()
        }
    }

    async fn add_agent(store: &SurrealStore, tenant: &TenantUuid, name: &str) -> AgentUuid {
        store
            .insert_agent(&AgentCreate {
                uuid: AgentUuid::generate(),
                username: Username::new(name),
                email: format!("{}@acme.test", name),
                first_name: name.to_string(),
                last_name: "Analyst".to_string(),
                tenant: tenant.clone(),
            })
            .await
            .unwrap()
            .uuid
    }

    #[tokio::test]
    async fn test_create_defaults_to_open() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();
        assert_eq!(created.state, State::Open);
        assert!(created.date_reported.is_some());
    }

    #[tokio::test]
    async fn test_create_validates() {
        let fx = setup().await;

        let mut missing = report(&fx.tenant);
        missing.description = Some("   ".to_string());
        assert!(matches!(
            fx.service.create(missing).await,
            Err(IncidentError::InvalidData(_))
        ));

        let mut unknown = report(&fx.tenant);
        unknown.reported_by_tenant = Some(TenantUuid::new("nobody"));
        assert!(matches!(
            fx.service.create(unknown).await,
            Err(IncidentError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_twelve_incidents_page_by_five() {
        let fx = setup().await;
        for _ in 0..12 {
            fx.service.create(report(&fx.tenant)).await.unwrap();
        }

        let first = fx
            .service
            .list(&IncidentFilterBuilder::new().build().unwrap())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total_items, 12);
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let last = fx
            .service
            .list(
                &IncidentFilterBuilder::new()
                    .page(PageRequest::new(2, 5).unwrap())
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 2);
        assert!(!last.has_next());
        assert!(last.has_previous());
    }

    #[tokio::test]
    async fn test_list_applies_every_predicate() {
        let fx = setup().await;
        fx.service.create(report(&fx.tenant)).await.unwrap();
        let mut low = report(&fx.tenant);
        low.severity = Some(Severity::Low);
        fx.service.create(low).await.unwrap();

        let filter = IncidentFilterBuilder::new()
            .incident_type(Some("Malware"))
            .severity(Some("low"))
            .build()
            .unwrap();
        let page = fx.service.list(&filter).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();

        let patch = IncidentPatch {
            state: Some(State::InProgress),
            location: Some("Berlin".to_string()),
            ..Default::default()
        };
        let updated = fx.service.update(&created.uuid, patch).await.unwrap();

        assert_eq!(updated.state, State::InProgress);
        assert_eq!(updated.location.as_deref(), Some("Berlin"));
        assert_eq!(updated.description, "Trojan found");
        assert_eq!(updated.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_delete_refuses_open() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();

        assert!(matches!(
            fx.service.delete(&created.uuid).await,
            Err(IncidentError::StillOpen(_))
        ));

        let resolved = fx.service.resolve(&created.uuid).await.unwrap();
        assert_eq!(resolved.state, State::Close);
        assert!(resolved.date_resolved.is_some());

        fx.service.delete(&created.uuid).await.unwrap();
        assert!(matches!(
            fx.service.get(&created.uuid).await,
            Err(IncidentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_open() {
        let fx = setup().await;
        let a = fx.service.create(report(&fx.tenant)).await.unwrap();
        fx.service.create(report(&fx.tenant)).await.unwrap();
        fx.service.resolve(&a.uuid).await.unwrap();

        let open = fx.service.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].uuid, a.uuid);
    }

    #[tokio::test]
    async fn test_assign_picks_agent_once() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();

        assert!(matches!(
            fx.service.assign(&created.uuid).await,
            Err(IncidentError::NoAgents)
        ));

        let agent = add_agent(&fx.store, &fx.tenant, "dana").await;
        let assigned = fx.service.assign(&created.uuid).await.unwrap();
        assert_eq!(assigned.assigned_to_user, Some(agent));

        assert!(matches!(
            fx.service.assign(&created.uuid).await,
            Err(IncidentError::AlreadyAssigned(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_assign_has_one_winner() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();
        for name in ["dana", "eli", "fay"] {
            add_agent(&fx.store, &fx.tenant, name).await;
        }

        let (first, second) = tokio::join!(
            fx.service.assign(&created.uuid),
            fx.service.assign(&created.uuid)
        );
        let winners: Vec<_> = [first, second].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);

        let stored = fx.service.get(&created.uuid).await.unwrap();
        assert_eq!(stored.assigned_to_user, winners[0].assigned_to_user);
    }

    #[tokio::test]
    async fn test_update_sets_resolution_time() {
        let fx = setup().await;
        let created = fx.service.create(report(&fx.tenant)).await.unwrap();

        let patch: IncidentPatch = serde_json::from_value(serde_json::json!({
            "state": "Close",
            "dateResolved": "2024-05-01T12:00:00Z",
        }))
        .unwrap();
        let updated = fx.service.update(&created.uuid, patch).await.unwrap();

        assert_eq!(updated.state, State::Close);
        assert_eq!(
            updated.date_resolved.map(|d| d.0.to_rfc3339()),
            Some("2024-05-01T12:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_incident() {
        let fx = setup().await;
        let ghost = IncidentUuid::new("missing");
        assert!(matches!(fx.service.get(&ghost).await, Err(IncidentError::NotFound(_))));
        assert!(matches!(fx.service.resolve(&ghost).await, Err(IncidentError::NotFound(_))));
        assert!(matches!(
            fx.service.update(&ghost, IncidentPatch::default()).await,
            Err(IncidentError::NotFound(_))
        ));
    }
}
