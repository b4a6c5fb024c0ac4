//! Typed views over the backend sections stores read at connect time.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Database used for the transient server connection when the target is missing.
    #[serde(default = "default_maintenance_db")]
    pub maintenance_database: String,
    #[serde(default = "default_schema")]
    pub schema: PathBuf,
}

fn default_pg_host() -> String { "localhost".into() }
fn default_pg_port() -> u16 { 5432 }
fn default_maintenance_db() -> String { "postgres".into() }
fn default_schema() -> PathBuf { PathBuf::from("conf/schema.sql") }

impl PostgresConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("postgres.host is empty"));
        }
        if self.user.trim().is_empty() {
            return Err(anyhow!("postgres.user is empty"));
        }
        if self.database.trim().is_empty() {
            return Err(anyhow!("postgres.database is empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("postgres.port must be in 1..=65535"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub database: i64,
}

fn default_redis_port() -> u16 { 6379 }

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.database)
    }
}

/// `directory = "/srv/data"` or `[directory] root = "/srv/data"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirectoryConfig {
    Path(PathBuf),
    Table { root: PathBuf },
}

impl DirectoryConfig {
    pub fn root(&self) -> &Path {
        match self {
            DirectoryConfig::Path(p) => p,
            DirectoryConfig::Table { root } => root,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_profile() -> String { "default".into() }
