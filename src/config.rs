use serde::{Deserialize, Serialize};
use std::{env, fmt, fs, path::Path, str::FromStr};

use crate::gate::ClaimPolicy;

const DEFAULT_CONFIG_PATH: &str = "coupon-config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Marks the claim cookie `Secure`.
    pub production: bool,
    pub cors_origin: Option<String>,
    pub claim_cookie_seconds: u64,
    pub claim_policy: ClaimPolicy,
    pub bootstrap_schema: bool,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 10000,
            production: true,
            cors_origin: None,
            claim_cookie_seconds: 3600, // 1 hour
            claim_policy: ClaimPolicy::DualGate,
            bootstrap_schema: true,
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl: bool,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "coupons".to_string(),
            ssl: false,
            max_connections: 10,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("ssl", &self.ssl)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Config {
    /// Reads the optional TOML file, then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            env::var("COUPON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let contents = if Path::new(&config_path).exists() {
            Some(fs::read_to_string(&config_path)?)
        } else {
            None
        };

        Self::from_sources(contents.as_deref(), |key| env::var(key).ok())
    }

    pub fn from_sources(
        contents: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config: Config = match contents {
            Some(contents) => toml::from_str(contents)?,
            None => Config::default(),
        };

        override_with(&lookup, "PORT", &mut config.port)?;
        if let Some(app_env) = lookup("APP_ENV") {
            config.production = app_env == "production";
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            config.cors_origin = Some(origin).filter(|o| !o.is_empty());
        }
        override_with(&lookup, "CLAIM_COOKIE_SECONDS", &mut config.claim_cookie_seconds)?;
        override_with(&lookup, "CLAIM_POLICY", &mut config.claim_policy)?;
        override_with(&lookup, "BOOTSTRAP_SCHEMA", &mut config.bootstrap_schema)?;

        let db = &mut config.database;
        override_with(&lookup, "DB_HOST", &mut db.host)?;
        override_with(&lookup, "DB_PORT", &mut db.port)?;
        override_with(&lookup, "DB_USER", &mut db.user)?;
        override_with(&lookup, "DB_PASSWORD", &mut db.password)?;
        override_with(&lookup, "DB_NAME", &mut db.name)?;
        if let Some(ssl) = lookup("DB_SSL") {
            db.ssl = ssl == "true";
        }
        override_with(&lookup, "DB_MAX_CONNECTIONS", &mut db.max_connections)?;

        Ok(config)
    }
}

fn override_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}"))?;
    }
    Ok(())
}
