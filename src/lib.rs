//! Multi-tenant incident desk.
//!
//! Tenants log in for an HS256 bearer token, then report, list, resolve and
//! assign security incidents over a REST API backed by SurrealDB.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod incident;
pub mod model;
pub mod store;
pub mod types;

pub use api::{AppState, create_router};
pub use auth::{AuthError, AuthGate, Principal, TokenConfig, TokenService};
pub use config::AppConfig;
pub use db::{DatabaseConfig, SurrealStore, create_connection, ensure_schema};
pub use directory::{DirectoryService, NewTenant};
pub use incident::{IncidentFilter, IncidentFilterBuilder, IncidentService};

use anyhow::Result;
use std::sync::Arc;

/// Connect to the configured database and make sure the schema exists.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<SurrealStore>> {
    let db = create_connection(config.clone()).await?;
    ensure_schema(&db).await?;
    Ok(Arc::new(SurrealStore::new(db)))
}

/// Build the full application router for `config`.
pub async fn create_app(config: &AppConfig) -> Result<(axum::Router, AppState)> {
    let store = open_store(&config.database).await?;
    let state = AppState::new(store, config)?;
    Ok((create_router(state.clone()), state))
}
