use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use pinboard_api::auth::{AuthConfig, HashCost};

/// Secrets that are only fit for local development.
pub const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "your_jwt_secret"];

const DEFAULT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = HashCost::default();

        Ok(Self {
            host: lookup("PINBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PINBOARD_PORT", 3000)?,
            data_dir: lookup("PINBOARD_DATA_DIR")
                .unwrap_or_else(|| "data".into())
                .into(),
            auth: AuthConfig {
                jwt_secret: lookup("PINBOARD_JWT_SECRET")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_SECRET.into()),
                hash_cost: HashCost {
                    memory_kib: parse_or(&lookup, "PINBOARD_ARGON2_MEMORY_KIB", defaults.memory_kib)?,
                    iterations: parse_or(&lookup, "PINBOARD_ARGON2_ITERATIONS", defaults.iterations)?,
                    parallelism: parse_or(&lookup, "PINBOARD_ARGON2_PARALLELISM", defaults.parallelism)?,
                },
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.auth.jwt_secret.as_str())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
