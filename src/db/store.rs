// SurrealDB implementation of the storage collaborators.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::db::Db;
use crate::db::schema::*;
use crate::incident::IncidentFilter;
use crate::model::State;
use crate::store::{
    AgentStore, Identity, IdentityStore, IncidentStore, StoreError, StoreFuture, TenantStore,
};
use crate::types::{AgentUuid, IncidentUuid, TenantUuid, Username};

/// Every store trait backed by one SurrealDB handle.
#[derive(Clone)]
pub struct SurrealStore {
    db: Db,
}

impl SurrealStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn tenant_by_username(&self, username: &Username) -> Result<Option<TenantRecord>, StoreError> {
        let mut res = self
            .db
            .query("SELECT * FROM tenant WHERE username = $username LIMIT 1")
            .bind(("username", username.clone()))
            .await?;

        let tenant: Option<TenantRecord> = res.take(0)?;
        Ok(tenant)
    }

    /// Unfiltered page of `table` in `order`, plus the table's row count.
    async fn page_of<T: DeserializeOwned>(
        &self,
        table: &str,
        order: &str,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<T>, u64), StoreError> {
        let sql = format!(
            "SELECT * FROM {table} ORDER BY {order} LIMIT $limit START $start;
             SELECT count() AS total FROM {table} GROUP ALL;"
        );
        let mut res = self
            .db
            .query(sql)
            .bind(("limit", limit))
            .bind(("start", offset))
            .await?;

        let items: Vec<T> = res.take(0)?;
        let count: Option<CountRow> = res.take(1)?;
        Ok((items, count.map(|c| c.total).unwrap_or(0)))
    }
}

/// `WHERE a = $a AND b = $b` for the filter's predicates, or empty.
fn where_clause(filter: &IncidentFilter) -> String {
    let predicates = filter.predicates();
    if predicates.is_empty() {
        return String::new();
    }

    let tests: Vec<String> = predicates
        .iter()
        .map(|p| format!("{} = ${}", p.field, p.field))
        .collect();
    format!("WHERE {}", tests.join(" AND "))
}

impl IdentityStore for SurrealStore {
    fn find_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(async move {
            Ok(self.tenant_by_username(username).await?.map(|t| Identity {
                username: t.username,
                password_hash: t.password,
                permissions: t.roles,
            }))
        })
    }

    fn exists_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.tenant_by_username(username).await?.is_some()) })
    }
}

impl TenantStore for SurrealStore {
    fn insert_tenant<'a>(&'a self, tenant: &'a TenantCreate) -> StoreFuture<'a, TenantRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    CREATE tenant SET
                        uuid = $uuid,
                        name = $name,
                        description = $description,
                        parent_soc_tenant_id = $parent_soc_tenant_id,
                        username = $username,
                        password = $password,
                        roles = $roles
                    "#,
                )
                .bind(("uuid", tenant.uuid.clone()))
                .bind(("name", tenant.name.clone()))
                .bind(("description", tenant.description.clone()))
                .bind(("parent_soc_tenant_id", tenant.parent_soc_tenant_id.clone()))
                .bind(("username", tenant.username.clone()))
                .bind(("password", tenant.password_hash.clone()))
                .bind(("roles", tenant.roles.clone()))
                .await?;

            let created: Option<TenantRecord> = res.take(0)?;
            created.ok_or_else(|| StoreError::Missing(format!("tenant {}", tenant.uuid)))
        })
    }

    fn find_tenant<'a>(&'a self, uuid: &'a TenantUuid) -> StoreFuture<'a, Option<TenantRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM tenant WHERE uuid = $uuid LIMIT 1")
                .bind(("uuid", uuid.clone()))
                .await?;

            let tenant: Option<TenantRecord> = res.take(0)?;
            Ok(tenant)
        })
    }

    fn page_tenants(&self, offset: u64, limit: u64) -> StoreFuture<'_, (Vec<TenantRecord>, u64)> {
        Box::pin(self.page_of("tenant", "name ASC, uuid ASC", offset, limit))
    }

    fn save_tenant<'a>(&'a self, tenant: &'a TenantRecord) -> StoreFuture<'a, TenantRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    UPDATE tenant SET
                        name = $name,
                        description = $description,
                        username = $username,
                        roles = $roles
                    WHERE uuid = $uuid
                    RETURN AFTER
                    "#,
                )
                .bind(("uuid", tenant.uuid.clone()))
                .bind(("name", tenant.name.clone()))
                .bind(("description", tenant.description.clone()))
                .bind(("username", tenant.username.clone()))
                .bind(("roles", tenant.roles.clone()))
                .await?;

            let updated: Vec<TenantRecord> = res.take(0)?;
            updated
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Missing(format!("tenant {}", tenant.uuid)))
        })
    }

    fn delete_tenant<'a>(&'a self, uuid: &'a TenantUuid) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("DELETE tenant WHERE uuid = $uuid RETURN BEFORE")
                .bind(("uuid", uuid.clone()))
                .await?;

            let removed: Vec<TenantRecord> = res.take(0)?;
            Ok(!removed.is_empty())
        })
    }
}

impl AgentStore for SurrealStore {
    fn insert_agent<'a>(&'a self, agent: &'a AgentCreate) -> StoreFuture<'a, AgentRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    CREATE agent SET
                        uuid = $uuid,
                        username = $username,
                        email = $email,
                        first_name = $first_name,
                        last_name = $last_name,
                        tenant = $tenant
                    "#,
                )
                .bind(("uuid", agent.uuid.clone()))
                .bind(("username", agent.username.clone()))
                .bind(("email", agent.email.clone()))
                .bind(("first_name", agent.first_name.clone()))
                .bind(("last_name", agent.last_name.clone()))
                .bind(("tenant", agent.tenant.clone()))
                .await?;

            let created: Option<AgentRecord> = res.take(0)?;
            created.ok_or_else(|| StoreError::Missing(format!("agent {}", agent.uuid)))
        })
    }

    fn find_agent<'a>(&'a self, uuid: &'a AgentUuid) -> StoreFuture<'a, Option<AgentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM agent WHERE uuid = $uuid LIMIT 1")
                .bind(("uuid", uuid.clone()))
                .await?;

            let agent: Option<AgentRecord> = res.take(0)?;
            Ok(agent)
        })
    }

    fn agent_username_taken<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM agent WHERE username = $username LIMIT 1")
                .bind(("username", username.clone()))
                .await?;

            let agent: Option<AgentRecord> = res.take(0)?;
            Ok(agent.is_some())
        })
    }

    fn list_agents(&self) -> StoreFuture<'_, Vec<AgentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM agent ORDER BY username ASC")
                .await?;

            let agents: Vec<AgentRecord> = res.take(0)?;
            Ok(agents)
        })
    }

    fn page_agents(&self, offset: u64, limit: u64) -> StoreFuture<'_, (Vec<AgentRecord>, u64)> {
        Box::pin(self.page_of("agent", "username ASC, uuid ASC", offset, limit))
    }

    fn save_agent<'a>(&'a self, agent: &'a AgentRecord) -> StoreFuture<'a, AgentRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    UPDATE agent SET
                        username = $username,
                        email = $email,
                        first_name = $first_name,
                        last_name = $last_name
                    WHERE uuid = $uuid
                    RETURN AFTER
                    "#,
                )
                .bind(("uuid", agent.uuid.clone()))
                .bind(("username", agent.username.clone()))
                .bind(("email", agent.email.clone()))
                .bind(("first_name", agent.first_name.clone()))
                .bind(("last_name", agent.last_name.clone()))
                .await?;

            let updated: Vec<AgentRecord> = res.take(0)?;
            updated
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Missing(format!("agent {}", agent.uuid)))
        })
    }

    fn delete_agent<'a>(&'a self, uuid: &'a AgentUuid) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("DELETE agent WHERE uuid = $uuid RETURN BEFORE")
                .bind(("uuid", uuid.clone()))
                .await?;

            let removed: Vec<AgentRecord> = res.take(0)?;
            Ok(!removed.is_empty())
        })
    }
}

impl IncidentStore for SurrealStore {
    fn page<'a>(
        &'a self,
        filter: &'a IncidentFilter,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, (Vec<IncidentRecord>, u64)> {
        Box::pin(async move {
            let clause = where_clause(filter);
            let sql = format!(
                "SELECT * FROM incident {clause} ORDER BY date_reported ASC, uuid ASC LIMIT $limit START $start;
                 SELECT count() AS total FROM incident {clause} GROUP ALL;"
            );
            debug!(%sql, offset, limit, "paging incidents");

            let mut query = self.db.query(sql);
            for predicate in filter.predicates() {
                query = query.bind((predicate.field, predicate.value));
            }
            let mut res = query
                .bind(("limit", limit))
                .bind(("start", offset))
                .await?;

            let items: Vec<IncidentRecord> = res.take(0)?;
            let count: Option<CountRow> = res.take(1)?;
            Ok((items, count.map(|c| c.total).unwrap_or(0)))
        })
    }

    fn find_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, Option<IncidentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM incident WHERE uuid = $uuid LIMIT 1")
                .bind(("uuid", uuid.clone()))
                .await?;

            let incident: Option<IncidentRecord> = res.take(0)?;
            Ok(incident)
        })
    }

    fn list_by_state(&self, state: State) -> StoreFuture<'_, Vec<IncidentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("SELECT * FROM incident WHERE state = $state ORDER BY date_reported ASC, uuid ASC")
                .bind(("state", state))
                .await?;

            let incidents: Vec<IncidentRecord> = res.take(0)?;
            Ok(incidents)
        })
    }

    fn has_open_for_tenant<'a>(&'a self, tenant: &'a TenantUuid) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    "SELECT count() AS total FROM incident WHERE reported_by_tenant = $tenant AND state = $state GROUP ALL",
                )
                .bind(("tenant", tenant.clone()))
                .bind(("state", State::Open))
                .await?;

            let count: Option<CountRow> = res.take(0)?;
            Ok(count.is_some_and(|c| c.total > 0))
        })
    }

    fn insert_incident<'a>(&'a self, incident: &'a IncidentCreate) -> StoreFuture<'a, IncidentRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    CREATE incident SET
                        uuid = $uuid,
                        incident_type = $incident_type,
                        description = $description,
                        severity = $severity,
                        state = $state,
                        device = $device,
                        location = $location,
                        priority = $priority,
                        sha256 = $sha256,
                        reported_by_tenant = $reported_by_tenant,
                        assigned_to_user = $assigned_to_user,
                        date_reported = time::now(),
                        date_resolved = NONE
                    "#,
                )
                .bind(("uuid", incident.uuid.clone()))
                .bind(("incident_type", incident.incident_type.clone()))
                .bind(("description", incident.description.clone()))
                .bind(("severity", incident.severity))
                .bind(("state", incident.state))
                .bind(("device", incident.device.clone()))
                .bind(("location", incident.location.clone()))
                .bind(("priority", incident.priority))
                .bind(("sha256", incident.sha256.clone()))
                .bind(("reported_by_tenant", incident.reported_by_tenant.clone()))
                .bind(("assigned_to_user", incident.assigned_to_user.clone()))
                .await?;

            let created: Option<IncidentRecord> = res.take(0)?;
            created.ok_or_else(|| StoreError::Missing(format!("incident {}", incident.uuid)))
        })
    }

    fn save_incident<'a>(&'a self, incident: &'a IncidentRecord) -> StoreFuture<'a, IncidentRecord> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    UPDATE incident SET
                        incident_type = $incident_type,
                        description = $description,
                        severity = $severity,
                        state = $state,
                        device = $device,
                        location = $location,
                        priority = $priority,
                        sha256 = $sha256,
                        date_resolved = $date_resolved,
                        assigned_to_user = $assigned_to_user
                    WHERE uuid = $uuid
                    RETURN AFTER
                    "#,
                )
                .bind(("uuid", incident.uuid.clone()))
                .bind(("incident_type", incident.incident_type.clone()))
                .bind(("description", incident.description.clone()))
                .bind(("severity", incident.severity))
                .bind(("state", incident.state))
                .bind(("device", incident.device.clone()))
                .bind(("location", incident.location.clone()))
                .bind(("priority", incident.priority))
                .bind(("sha256", incident.sha256.clone()))
                .bind(("date_resolved", incident.date_resolved.clone()))
                .bind(("assigned_to_user", incident.assigned_to_user.clone()))
                .await?;

            let updated: Vec<IncidentRecord> = res.take(0)?;
            updated
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Missing(format!("incident {}", incident.uuid)))
        })
    }

    fn assign_if_unassigned<'a>(
        &'a self,
        uuid: &'a IncidentUuid,
        agent: &'a AgentUuid,
    ) -> StoreFuture<'a, Option<IncidentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    r#"
                    UPDATE incident SET assigned_to_user = $agent
                    WHERE uuid = $uuid AND (assigned_to_user = NONE OR assigned_to_user = NULL)
                    RETURN AFTER
                    "#,
                )
                .bind(("uuid", uuid.clone()))
                .bind(("agent", agent.clone()))
                .await?;

            let updated: Vec<IncidentRecord> = res.take(0)?;
            Ok(updated.into_iter().next())
        })
    }

    fn resolve_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, Option<IncidentRecord>> {
        Box::pin(async move {
            let mut res = self
                .db
                .query(
                    "UPDATE incident SET state = $state, date_resolved = time::now() WHERE uuid = $uuid RETURN AFTER",
                )
                .bind(("uuid", uuid.clone()))
                .bind(("state", State::Close))
                .await?;

            let updated: Vec<IncidentRecord> = res.take(0)?;
            Ok(updated.into_iter().next())
        })
    }

    fn delete_incident<'a>(&'a self, uuid: &'a IncidentUuid) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut res = self
                .db
                .query("DELETE incident WHERE uuid = $uuid RETURN BEFORE")
                .bind(("uuid", uuid.clone()))
                .await?;

            let removed: Vec<IncidentRecord> = res.take(0)?;
            Ok(!removed.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::incident::{IncidentFilterBuilder, PageRequest};
    use crate::model::{Priority, Severity};

    async fn setup_store() -> SurrealStore {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        SurrealStore::new(db)
    }

    fn incident(kind: &str, severity: Severity, state: State) -> IncidentCreate {
        IncidentCreate {
            uuid: IncidentUuid::generate(),
            incident_type: kind.to_string(),
            description: format!("{} on host", kind),
            severity,
            state,
            device: Some("laptop-7".to_string()),
            location: None,
            priority: Priority::Medium,
            sha256: None,
            reported_by_tenant: TenantUuid::new("tenant-1"),
            assigned_to_user: None,
        }
    }

    fn tenant(username: &str) -> TenantCreate {
        TenantCreate {
            uuid: TenantUuid::generate(),
            name: format!("{} corp", username),
            description: None,
            parent_soc_tenant_id: None,
            username: Username::new(username),
            password_hash: "$2b$04$hash".to_string(),
            roles: "incident.get incident.create".to_string(),
        }
    }

    #[test]
    fn test_where_clause() {
        assert_eq!(where_clause(&IncidentFilter::default()), "");

        let filter = IncidentFilterBuilder::new()
            .severity(Some("High"))
            .state(Some("Open"))
            .build()
            .unwrap();
        assert_eq!(where_clause(&filter), "WHERE severity = $severity AND state = $state");
    }

    #[tokio::test]
    async fn test_identity_lookup() {
        let store = setup_store().await;
        store.insert_tenant(&tenant("acme")).await.unwrap();

        let identity = store
            .find_by_username(&Username::new("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.password_hash, "$2b$04$hash");
        assert_eq!(identity.permission_string(), "incident.get incident.create");

        assert!(store.exists_by_username(&Username::new("acme")).await.unwrap());
        assert!(!store.exists_by_username(&Username::new("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_tenant_username_rejected() {
        let store = setup_store().await;
        store.insert_tenant(&tenant("acme")).await.unwrap();
        assert!(matches!(
            store.insert_tenant(&tenant("acme")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_paging_is_stable_and_counted() {
        let store = setup_store().await;
        for _ in 0..12 {
            store
                .insert_incident(&incident("Malware", Severity::High, State::Open))
                .await
                .unwrap();
        }
        store
            .insert_incident(&incident("Phishing", Severity::Low, State::Close))
            .await
            .unwrap();

        let filter = IncidentFilterBuilder::new()
            .incident_type(Some("Malware"))
            .page(PageRequest::new(0, 5).unwrap())
            .build()
            .unwrap();

        let (first, total) = store.page(&filter, 0, 5).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(total, 12);

        let (again, _) = store.page(&filter, 0, 5).await.unwrap();
        let uuids = |v: &[IncidentRecord]| v.iter().map(|i| i.uuid.clone()).collect::<Vec<_>>();
        assert_eq!(uuids(&first), uuids(&again));

        let (last, _) = store.page(&filter, 10, 5).await.unwrap();
        assert_eq!(last.len(), 2);
        assert!(last.iter().all(|i| i.incident_type == "Malware"));
    }

    #[tokio::test]
    async fn test_resolve_and_delete() {
        let store = setup_store().await;
        let created = store
            .insert_incident(&incident("Malware", Severity::Critical, State::Open))
            .await
            .unwrap();
        assert!(created.date_reported.is_some());
        assert!(created.date_resolved.is_none());

        let resolved = store.resolve_incident(&created.uuid).await.unwrap().unwrap();
        assert_eq!(resolved.state, State::Close);
        assert!(resolved.date_resolved.is_some());

        assert!(store.delete_incident(&created.uuid).await.unwrap());
        assert!(!store.delete_incident(&created.uuid).await.unwrap());
        assert!(store.find_incident(&created.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_state() {
        let store = setup_store().await;
        store
            .insert_incident(&incident("Malware", Severity::High, State::Open))
            .await
            .unwrap();
        store
            .insert_incident(&incident("Phishing", Severity::Low, State::InProgress))
            .await
            .unwrap();

        let open = store.list_by_state(State::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].incident_type, "Malware");
    }

    #[tokio::test]
    async fn test_tenant_page_save_delete() {
        let store = setup_store().await;
        for name in ["delta", "alpha", "charlie", "bravo"] {
            store.insert_tenant(&tenant(name)).await.unwrap();
        }

        let (first, total) = store.page_tenants(0, 3).await.unwrap();
        assert_eq!(total, 4);
        let names: Vec<_> = first.iter().map(|t| t.username.as_str().to_string()).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);

        let (rest, _) = store.page_tenants(3, 3).await.unwrap();
        assert_eq!(rest.len(), 1);

        let mut alpha = first[0].clone();
        let created_at = alpha.created_at.clone();
        alpha.description = Some("renamed".to_string());
        let saved = store.save_tenant(&alpha).await.unwrap();
        assert_eq!(saved.description.as_deref(), Some("renamed"));
        assert_eq!(saved.password, "$2b$04$hash");
        assert_eq!(saved.created_at, created_at);

        assert!(store.delete_tenant(&alpha.uuid).await.unwrap());
        assert!(!store.delete_tenant(&alpha.uuid).await.unwrap());
        assert!(store.find_tenant(&alpha.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_has_open_for_tenant() {
        let store = setup_store().await;
        let reporter = TenantUuid::new("tenant-1");
        assert!(!store.has_open_for_tenant(&reporter).await.unwrap());

        let created = store
            .insert_incident(&incident("Malware", Severity::High, State::Open))
            .await
            .unwrap();
        assert!(store.has_open_for_tenant(&reporter).await.unwrap());
        assert!(!store.has_open_for_tenant(&TenantUuid::new("other")).await.unwrap());

        store.resolve_incident(&created.uuid).await.unwrap();
        assert!(!store.has_open_for_tenant(&reporter).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_only_when_unassigned() {
        let store = setup_store().await;
        let created = store
            .insert_incident(&incident("Malware", Severity::High, State::Open))
            .await
            .unwrap();

        let first = AgentUuid::new("agent-1");
        let second = AgentUuid::new("agent-2");

        let assigned = store
            .assign_if_unassigned(&created.uuid, &first)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assigned.assigned_to_user, Some(first.clone()));

        assert!(
            store
                .assign_if_unassigned(&created.uuid, &second)
                .await
                .unwrap()
                .is_none()
        );
        let current = store.find_incident(&created.uuid).await.unwrap().unwrap();
        assert_eq!(current.assigned_to_user, Some(first));

        assert!(
            store
                .assign_if_unassigned(&IncidentUuid::new("missing"), &second)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_save_incident_keeps_resolution_time() {
        let store = setup_store().await;
        let mut record = store
            .insert_incident(&incident("Malware", Severity::High, State::Open))
            .await
            .unwrap();

        let resolved_at = chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        record.state = State::Close;
        record.date_resolved = Some(resolved_at.into());

        let saved = store.save_incident(&record).await.unwrap();
        assert_eq!(saved.date_resolved.map(|d| d.0), Some(resolved_at));
    }
}
