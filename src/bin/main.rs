use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use incident_desk::auth::{DEFAULT_EXPIRATION_MS, TokenConfig, TokenService};
use incident_desk::config::{AppConfig, CliOverrides, DEFAULT_BCRYPT_COST};
use incident_desk::directory::{DirectoryService, NewTenant};
use incident_desk::types::Username;
use incident_desk::{DatabaseConfig, create_app, open_store};

#[derive(Parser)]
#[command(name = "incident-desk")]
#[command(about = "Multi-tenant security incident desk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST server
    Server {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Database URL. Falls back to the config file, then to `memory`.
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
        /// HS256 signing secret. Falls back to the config file when unset.
        #[arg(long, env = "INCIDENT_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
        #[arg(long, env = "INCIDENT_JWT_EXPIRATION_MS")]
        jwt_expiration_ms: Option<i64>,
        /// Comma-separated path prefixes that skip authentication
        #[arg(long, env = "INCIDENT_PUBLIC_PREFIXES")]
        public_prefixes: Option<String>,
        #[arg(long, env = "INCIDENT_BCRYPT_COST")]
        bcrypt_cost: Option<u32>,
        /// Register this tenant on startup (handy with the in-memory database)
        #[arg(long, requires = "seed_password")]
        seed_username: Option<String>,
        #[arg(long, env = "INCIDENT_SEED_PASSWORD", hide_env_values = true)]
        seed_password: Option<String>,
        #[arg(long, default_value = "incident.get incident.create incident.update incident.delete")]
        seed_roles: String,
    },
    /// Initialize the database schema
    Init {
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
    },
    /// Register a tenant directly in the database
    CreateTenant {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "INCIDENT_TENANT_PASSWORD", hide_env_values = true)]
        password: String,
        /// Space or comma separated permissions
        #[arg(long, default_value = "incident.get")]
        roles: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        parent_soc_tenant_id: Option<String>,
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
    },
    /// Sign a token offline, for scripts and local testing
    IssueToken {
        subject: String,
        #[arg(long, default_value = "incident.get")]
        roles: String,
        #[arg(long, env = "INCIDENT_JWT_SECRET", hide_env_values = true)]
        jwt_secret: String,
        #[arg(long, env = "INCIDENT_JWT_EXPIRATION_MS", default_value_t = DEFAULT_EXPIRATION_MS)]
        jwt_expiration_ms: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("incident_desk=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            host,
            db_url,
            jwt_secret,
            jwt_expiration_ms,
            public_prefixes,
            bcrypt_cost,
            seed_username,
            seed_password,
            seed_roles,
        } => {
            let mut config = match jwt_secret {
                Some(secret) => AppConfig::with_secret(secret),
                None => AppConfig::load()?,
            };
            config.apply_cli(CliOverrides {
                db_url,
                jwt_expiration_ms,
                public_prefixes,
                bcrypt_cost,
            });
            config.validate()?;

            info!("Using database url for REST server: {}", config.database.url);
            info!(prefixes = ?config.gate.public_prefixes, "public path prefixes");

            let (app, state) = create_app(&config).await?;

            if let (Some(username), Some(password)) = (seed_username, seed_password) {
                let tenant = state
                    .directory
                    .register_tenant(NewTenant {
                        name: username.clone(),
                        username,
                        password,
                        roles: seed_roles,
                        ..Default::default()
                    })
                    .await?;
                info!(tenant = %tenant.uuid, username = %tenant.username, "seeded tenant");
            }

            let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
            info!("Incident desk listening on http://{}:{}", host, port);
            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            let mut db_config = DatabaseConfig::default();
            if let Some(url) = db_url {
                db_config.url = url;
            }
            info!("Using database url for initialization: {}", db_config.url);

            open_store(&db_config).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateTenant {
            name,
            username,
            password,
            roles,
            description,
            parent_soc_tenant_id,
            db_url,
        } => {
            let mut db_config = DatabaseConfig::default();
            if let Some(url) = db_url {
                db_config.url = url;
            }
            let store = open_store(&db_config).await?;
            let directory = DirectoryService::new(store.clone(), store.clone(), store, DEFAULT_BCRYPT_COST);

            let tenant = directory
                .register_tenant(NewTenant {
                    name,
                    description,
                    parent_soc_tenant_id,
                    username,
                    password,
                    roles,
                })
                .await?;

            println!("Tenant created successfully!");
            println!();
            println!("  UUID:     {}", tenant.uuid);
            println!("  Username: {}", tenant.username);
            println!("  Roles:    {}", tenant.roles);
        }
        Commands::IssueToken {
            subject,
            roles,
            jwt_secret,
            jwt_expiration_ms,
        } => {
            let tokens = TokenService::new(&TokenConfig::new(jwt_secret, jwt_expiration_ms))?;
            let subject = Username::new(subject);
            println!("{}", tokens.issue(&subject, &roles));
        }
    }

    Ok(())
}
