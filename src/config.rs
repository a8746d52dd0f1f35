use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

use crate::auth::{DEFAULT_EXPIRATION_MS, GateConfig, TokenConfig};
use crate::db::DatabaseConfig;

pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

fn default_bcrypt_cost() -> u32 {
    DEFAULT_BCRYPT_COST
}

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db_url: Option<String>,
    pub jwt_expiration_ms: Option<i64>,
    pub public_prefixes: Option<String>,
    pub bcrypt_cost: Option<u32>,
}

/// Everything the desk needs at startup. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl AppConfig {
    /// Config for a given signing secret with every other value defaulted.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::default(),
            token: TokenConfig::new(secret, DEFAULT_EXPIRATION_MS),
            gate: GateConfig::default(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Parse a JSON config document, expanding `${VAR}` references first.
    pub fn from_json(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(raw, &lookup);
        let config: Self = serde_json::from_str(&expanded).context("invalid config file")?;
        Ok(config)
    }

    /// Load from the config file if one exists, otherwise from the
    /// environment alone. Environment variables override file values.
    pub fn load() -> anyhow::Result<Self> {
        let lookup = |name: &str| env::var(name).ok();

        let mut config = match resolve_config_path(&lookup) {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_json(&raw, lookup)?
            }
            None => {
                let secret = lookup("INCIDENT_JWT_SECRET")
                    .ok_or_else(|| anyhow!("INCIDENT_JWT_SECRET is not set and no config file was found"))?;
                Self::with_secret(secret)
            }
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(secret) = lookup("INCIDENT_JWT_SECRET") {
            self.token.secret = secret;
        }
        if let Some(raw) = lookup("INCIDENT_JWT_EXPIRATION_MS") {
            self.token.expiration_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("INCIDENT_JWT_EXPIRATION_MS is not a number: {}", raw))?;
        }
        if let Some(raw) = lookup("INCIDENT_PUBLIC_PREFIXES") {
            self.gate.public_prefixes = parse_prefix_list(&raw);
        }
        if let Some(raw) = lookup("INCIDENT_BCRYPT_COST") {
            self.bcrypt_cost = raw
                .trim()
                .parse()
                .with_context(|| format!("INCIDENT_BCRYPT_COST is not a number: {}", raw))?;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(url) = cli.db_url {
            self.database.url = url;
        }
        if let Some(ms) = cli.jwt_expiration_ms {
            self.token.expiration_ms = ms;
        }
        if let Some(raw) = cli.public_prefixes {
            self.gate.public_prefixes = parse_prefix_list(&raw);
        }
        if let Some(cost) = cli.bcrypt_cost {
            self.bcrypt_cost = cost;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.secret.is_empty() {
            return Err(anyhow!("token secret must not be empty"));
        }
        if self.token.expiration_ms <= 0 {
            return Err(anyhow!("token expiration must be positive"));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(anyhow!("bcrypt cost must be between 4 and 31, got {}", self.bcrypt_cost));
        }
        Ok(())
    }
}

/// Comma separated prefixes, each forced to start with `/`.
pub fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.starts_with('/') {
                p.to_string()
            } else {
                format!("/{}", p)
            }
        })
        .collect()
}

fn resolve_config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(p) = lookup("INCIDENT_DESK_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Some(xdg) = lookup("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("incident-desk").join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("incident-desk.json");
    candidate.exists().then_some(candidate)
}

fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match lookup(&name) {
                Some(val) => out.push_str(&val),
                None => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}
