use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone)]
pub struct Settings {
    pub port: u16,
    pub addr: SocketAddr,
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port: u16 = parse_or("PORT", 5000)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
        let jwt_ttl_hours = parse_or("JWT_TTL_HOURS", 24 * 7)?;

        Ok(Self {
            port,
            addr,
            database_url,
            database_max_connections,
            jwt_secret,
            jwt_ttl_hours,
        })
    }

    /// Settings for an in-process instance with no database behind it.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 0,
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            database_max_connections: 1,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 1,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        _ => Ok(default),
    }
}
