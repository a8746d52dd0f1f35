use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

pub type Db = Surreal<Any>;

/// Fields missing from a config file fall back to [`Default`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "incident".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "desk".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// In-process database, used by tests and throwaway servers.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "incident".to_string(),
            database: "desk".to_string(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    debug!(url = %config.url, namespace = %config.namespace, "connecting to SurrealDB");
    let db = surrealdb::engine::any::connect(config.url).await?;

    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        "DEFINE TABLE IF NOT EXISTS tenant SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS uuid ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS username ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS password ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS roles ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE tenant VALUE $before OR time::now();",

        "DEFINE TABLE IF NOT EXISTS agent SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS uuid ON TABLE agent TYPE string;
         DEFINE FIELD IF NOT EXISTS username ON TABLE agent TYPE string;
         DEFINE FIELD IF NOT EXISTS tenant ON TABLE agent TYPE string;
         DEFINE FIELD IF NOT EXISTS date_created ON TABLE agent VALUE $before OR time::now();",

        "DEFINE TABLE IF NOT EXISTS incident SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS uuid ON TABLE incident TYPE string;
         DEFINE FIELD IF NOT EXISTS incident_type ON TABLE incident TYPE string;
         DEFINE FIELD IF NOT EXISTS severity ON TABLE incident TYPE string;
         DEFINE FIELD IF NOT EXISTS state ON TABLE incident TYPE string;
         DEFINE FIELD IF NOT EXISTS priority ON TABLE incident TYPE string;
         DEFINE FIELD IF NOT EXISTS reported_by_tenant ON TABLE incident TYPE string;",

        "DEFINE INDEX IF NOT EXISTS tenant_uuid ON TABLE tenant COLUMNS uuid UNIQUE;
         DEFINE INDEX IF NOT EXISTS tenant_username ON TABLE tenant COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS agent_uuid ON TABLE agent COLUMNS uuid UNIQUE;
         DEFINE INDEX IF NOT EXISTS agent_username ON TABLE agent COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS incident_uuid ON TABLE incident COLUMNS uuid UNIQUE;
         DEFINE INDEX IF NOT EXISTS incident_state ON TABLE incident COLUMNS state;
         DEFINE INDEX IF NOT EXISTS incident_reported ON TABLE incident COLUMNS date_reported;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
