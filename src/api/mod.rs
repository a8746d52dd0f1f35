// REST API for the incident desk.

mod directory;
mod error;
mod incidents;
mod paging;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, put},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthError, AuthGate, CredentialAuthenticator, TokenService, auth_middleware};
use crate::config::AppConfig;
use crate::db::SurrealStore;
use crate::directory::DirectoryService;
use crate::incident::IncidentService;

pub use directory::{AgentListResponse, AgentView, PageParams, TenantListResponse, TenantView};
pub use error::ApiError;
pub use incidents::{IncidentListResponse, IncidentView, ListParams};
pub use paging::PageMeta;

/// Shared, immutable handles used by every handler.
#[derive(Clone)]
pub struct AppState {
    pub incidents: Arc<IncidentService>,
    pub directory: Arc<DirectoryService>,
    pub credentials: Arc<CredentialAuthenticator>,
    pub tokens: Arc<TokenService>,
    pub gate: AuthGate,
}

impl AppState {
    /// Wire every service onto one store.
    pub fn new(store: Arc<SurrealStore>, config: &AppConfig) -> Result<Self, AuthError> {
        let tokens = Arc::new(TokenService::new(&config.token)?);

        Ok(Self {
            incidents: Arc::new(IncidentService::new(store.clone(), store.clone(), store.clone())),
            directory: Arc::new(DirectoryService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                config.bcrypt_cost,
            )),
            credentials: Arc::new(CredentialAuthenticator::new(store.clone(), tokens.clone())),
            gate: AuthGate::new(config.gate.clone(), tokens.clone(), store),
            tokens,
        })
    }
}

/// Login, tenant and user management. Reachable without a token as long
/// as the gate lists their prefixes as public.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/login/tenant", get(directory::login_tenant))
        .route(
            "/v1/tenants",
            get(directory::list_tenants).post(directory::create_tenant),
        )
        .route(
            "/v1/tenants/{uuid}",
            get(directory::get_tenant)
                .put(directory::update_tenant)
                .delete(directory::delete_tenant),
        )
        .route(
            "/v1/users",
            get(directory::list_users).post(directory::create_user),
        )
        .route(
            "/v1/users/{uuid}",
            get(directory::get_user)
                .put(directory::update_user)
                .delete(directory::delete_user),
        )
}

fn incident_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/incidents",
            get(incidents::list_incidents).post(incidents::create_incident),
        )
        .route("/v1/incidents/open", get(incidents::list_open_incidents))
        .route(
            "/v1/incidents/{uuid}",
            get(incidents::get_incident)
                .put(incidents::update_incident)
                .delete(incidents::delete_incident),
        )
        .route("/v1/incidents/resolve/{uuid}", put(incidents::resolve_incident))
        .route("/v1/incidents/assignUser/{uuid}", put(incidents::assign_incident))
}

pub fn create_router(state: AppState) -> Router {
    let gate = state.gate.clone();

    Router::new()
        .merge(public_routes())
        .merge(incident_routes())
        .layer(middleware::from_fn_with_state(gate, auth_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
