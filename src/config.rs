//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/archi.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [auth]
//! secret = "change-me"
//!
//! [[auth.users]]
//! id = 1
//! name = "admin"
//! role = "administrator"
//! token = "admin-token"
//!
//! [cache]
//! ttl_secs = 3600
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::auth::Role;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key for CSRF tokens.
    pub secret: String,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub id: i64,
    pub name: String,
    pub role: Role,
    /// Bearer token presented in the `Authorization` header.
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Config {
    /// In-memory defaults for tests and embedding. Has no users.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/archi.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:7340".to_string(),
            },
            auth: AuthConfig {
                secret: "archi-graph-dev-secret".to_string(),
                users: Vec::new(),
            },
            cache: CacheConfig::default(),
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.auth.secret.trim().is_empty() {
        anyhow::bail!("auth.secret must not be empty");
    }

    let mut ids = HashSet::new();
    let mut tokens = HashSet::new();
    for user in &config.auth.users {
        if user.id <= 0 {
            anyhow::bail!("auth.users: id must be > 0 (user '{}')", user.name);
        }
        if !ids.insert(user.id) {
            anyhow::bail!("auth.users: duplicate user id {}", user.id);
        }
        if user.token.trim().is_empty() {
            anyhow::bail!("auth.users: token must not be empty (user '{}')", user.name);
        }
        if !tokens.insert(user.token.as_str()) {
            anyhow::bail!("auth.users: duplicate token (user '{}')", user.name);
        }
    }

    Ok(())
}
