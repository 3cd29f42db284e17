use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use tracing::{info, warn};

/// Development secret used when none is configured. Tokens signed with it
/// are forgeable by anyone who has read this file.
pub const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = env::var("DELICIOUS_JWT_SECRET").unwrap_or_default();
        let jwt_secret = if jwt_secret.is_empty() || jwt_secret == PLACEHOLDER_SECRET {
            warn!("DELICIOUS_JWT_SECRET is unset or still a placeholder; sessions are not secure");
            PLACEHOLDER_SECRET.to_string()
        } else {
            jwt_secret
        };

        Ok(Self {
            host: load("DELICIOUS_HOST", "0.0.0.0")?,
            port: load("DELICIOUS_PORT", "7777")?,
            db_path: load("DELICIOUS_DB_PATH", "delicious.db")?,
            jwt_secret,
            upload_dir: load("DELICIOUS_UPLOAD_DIR", "./public/uploads")?,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}"))
}
