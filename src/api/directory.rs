// Public endpoints: login plus tenant and user management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AppState, ApiError, PageMeta};
use crate::auth::AuthError;
use crate::db::{AgentRecord, TenantRecord};
use crate::directory::{AgentPatch, NewAgent, NewTenant, TenantPatch};
use crate::incident::{PageRequest, listing_link};
use crate::types::{AgentUuid, TenantUuid, Username};

const TENANTS_PATH: &str = "/v1/tenants";
const USERS_PATH: &str = "/v1/users";

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub tenants: Vec<TenantView>,
    #[serde(flatten)]
    pub page: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub users: Vec<AgentView>,
    #[serde(flatten)]
    pub page: PageMeta,
}

/// Tenant as shown to callers. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub uuid: TenantUuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_soc_tenant_id: Option<String>,
    pub username: Username,
    pub roles: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<TenantRecord> for TenantView {
    fn from(record: TenantRecord) -> Self {
        Self {
            uuid: record.uuid,
            name: record.name,
            description: record.description,
            parent_soc_tenant_id: record.parent_soc_tenant_id,
            username: record.username,
            roles: record.roles,
            created_at: record.created_at.map(|d| d.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub uuid: AgentUuid,
    pub username: Username,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tenant_id: TenantUuid,
    pub date_created: Option<DateTime<Utc>>,
}

impl From<AgentRecord> for AgentView {
    fn from(record: AgentRecord) -> Self {
        Self {
            uuid: record.uuid,
            username: record.username,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            tenant_id: record.tenant,
            date_created: record.date_created.map(|d| d.0),
        }
    }
}

/// `GET /v1/login/tenant` with Basic credentials; the body is the token.
pub async fn login_tenant(State(state): State<AppState>, headers: HeaderMap) -> Result<String, ApiError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| AuthError::AuthenticationFailed))
        .transpose()?;

    Ok(state.credentials.login(authorization).await?)
}

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(tenant): Json<NewTenant>,
) -> Result<(StatusCode, Json<TenantView>), ApiError> {
    let created = state.directory.register_tenant(tenant).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_tenants(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<TenantListResponse>, ApiError> {
    let request = PageRequest::from_params(params.page, params.size)?;
    let page = state.directory.list_tenants(request).await?;
    let meta = PageMeta::new(&page, |n| listing_link(TENANTS_PATH, n, page.size, &[]));

    Ok(Json(TenantListResponse {
        tenants: page.items.into_iter().map(TenantView::from).collect(),
        page: meta,
    }))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(uuid): Path<TenantUuid>,
) -> Result<Json<TenantView>, ApiError> {
    Ok(Json(state.directory.get_tenant(&uuid).await?.into()))
}

pub async fn update_tenant(
    State(state): State<AppState>,
    Path(uuid): Path<TenantUuid>,
    Json(patch): Json<TenantPatch>,
) -> Result<Json<TenantView>, ApiError> {
    Ok(Json(state.directory.update_tenant(&uuid, patch).await?.into()))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(uuid): Path<TenantUuid>,
) -> Result<StatusCode, ApiError> {
    state.directory.delete_tenant(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(agent): Json<NewAgent>,
) -> Result<(StatusCode, Json<AgentView>), ApiError> {
    let created = state.directory.register_agent(agent).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<AgentListResponse>, ApiError> {
    let request = PageRequest::from_params(params.page, params.size)?;
    let page = state.directory.list_agents(request).await?;
    let meta = PageMeta::new(&page, |n| listing_link(USERS_PATH, n, page.size, &[]));

    Ok(Json(AgentListResponse {
        users: page.items.into_iter().map(AgentView::from).collect(),
        page: meta,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(uuid): Path<AgentUuid>,
) -> Result<Json<AgentView>, ApiError> {
    Ok(Json(state.directory.get_agent(&uuid).await?.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(uuid): Path<AgentUuid>,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<AgentView>, ApiError> {
    Ok(Json(state.directory.update_agent(&uuid, patch).await?.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(uuid): Path<AgentUuid>,
) -> Result<StatusCode, ApiError> {
    state.directory.delete_agent(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
