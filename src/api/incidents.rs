// Incident endpoints. Every handler checks the caller's permission before
// touching the service.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AppState, ApiError, PageMeta};
use crate::auth::{Operation, Principal, authorize};
use crate::db::IncidentRecord;
use crate::incident::{IncidentFilter, IncidentFilterBuilder, IncidentPatch, NewIncident, Page, PageRequest};
use crate::model::{Priority, Severity, State as IncidentState};
use crate::types::{AgentUuid, IncidentUuid, TenantUuid};

const LISTING_PATH: &str = "/v1/incidents";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentView {
    pub uuid: IncidentUuid,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub state: IncidentState,
    pub device: Option<String>,
    pub location: Option<String>,
    pub priority: Priority,
    pub sha256: Option<String>,
    pub date_reported: Option<DateTime<Utc>>,
    pub date_resolved: Option<DateTime<Utc>>,
    pub reported_by_tenant_id: TenantUuid,
    pub assigned_to_user_id: Option<AgentUuid>,
}

impl From<IncidentRecord> for IncidentView {
    fn from(record: IncidentRecord) -> Self {
        Self {
            uuid: record.uuid,
            incident_type: record.incident_type,
            description: record.description,
            severity: record.severity,
            state: record.state,
            device: record.device,
            location: record.location,
            priority: record.priority,
            sha256: record.sha256,
            date_reported: record.date_reported.map(|d| d.0),
            date_resolved: record.date_resolved.map(|d| d.0),
            reported_by_tenant_id: record.reported_by_tenant,
            assigned_to_user_id: record.assigned_to_user,
        }
    }
}

/// Raw listing parameters. Literal validation happens in the filter builder.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(alias = "incident_type")]
    pub incident_type: Option<String>,
    pub severity: Option<String>,
    pub state: Option<String>,
    pub priority: Option<String>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

impl ListParams {
    fn into_filter(self) -> Result<IncidentFilter, ApiError> {
        let page = PageRequest::from_params(self.page, self.size)?;
        Ok(IncidentFilterBuilder::from_raw(
            self.incident_type,
            self.severity,
            self.state,
            self.priority,
            page,
        )?)
    }
}

#[derive(Debug, Serialize)]
pub struct IncidentListResponse {
    pub incidents: Vec<IncidentView>,
    #[serde(flatten)]
    pub page: PageMeta,
}

impl IncidentListResponse {
    fn from_page(page: Page<IncidentRecord>, filter: &IncidentFilter) -> Self {
        let meta = PageMeta::new(&page, |n| filter.page_link(LISTING_PATH, n));
        Self {
            incidents: page.items.into_iter().map(IncidentView::from).collect(),
            page: meta,
        }
    }
}

pub async fn list_incidents(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<Json<IncidentListResponse>, ApiError> {
    authorize(&principal, Operation::List)?;
    let filter = params.into_filter()?;

    let page = state.incidents.list(&filter).await?;
    Ok(Json(IncidentListResponse::from_page(page, &filter)))
}

pub async fn list_open_incidents(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<IncidentView>>, ApiError> {
    authorize(&principal, Operation::ListOpen)?;
    let open = state.incidents.list_open().await?;
    Ok(Json(open.into_iter().map(IncidentView::from).collect()))
}

pub async fn get_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(uuid): Path<IncidentUuid>,
) -> Result<Json<IncidentView>, ApiError> {
    authorize(&principal, Operation::Get)?;
    Ok(Json(state.incidents.get(&uuid).await?.into()))
}

pub async fn create_incident(
    State(state): State<AppState>,
    principal: Principal,
    Json(report): Json<NewIncident>,
) -> Result<(StatusCode, Json<IncidentView>), ApiError> {
    authorize(&principal, Operation::Create)?;
    let created = state.incidents.create(report).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn update_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(uuid): Path<IncidentUuid>,
    Json(patch): Json<IncidentPatch>,
) -> Result<Json<IncidentView>, ApiError> {
    authorize(&principal, Operation::Update)?;
    Ok(Json(state.incidents.update(&uuid, patch).await?.into()))
}

pub async fn delete_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(uuid): Path<IncidentUuid>,
) -> Result<StatusCode, ApiError> {
    authorize(&principal, Operation::Delete)?;
    state.incidents.delete(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resolve_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(uuid): Path<IncidentUuid>,
) -> Result<Json<IncidentView>, ApiError> {
    authorize(&principal, Operation::Resolve)?;
    Ok(Json(state.incidents.resolve(&uuid).await?.into()))
}

pub async fn assign_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(uuid): Path<IncidentUuid>,
) -> Result<Json<IncidentView>, ApiError> {
    authorize(&principal, Operation::Assign)?;
    Ok(Json(state.incidents.assign(&uuid).await?.into()))
}
