use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub namespace: String,
    pub bus_capacity: usize,
    pub heartbeat: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: string("COLLOQUY_HOST", "0.0.0.0"),
            port: parse(&lookup, "COLLOQUY_PORT", 3000)?,
            db_path: PathBuf::from(string("COLLOQUY_DB_PATH", "colloquy.db")),
            jwt_secret: string("COLLOQUY_JWT_SECRET", DEV_JWT_SECRET),
            namespace: string("COLLOQUY_NAMESPACE", "/chat"),
            bus_capacity: parse(&lookup, "COLLOQUY_BUS_CAPACITY", 1024)?,
            heartbeat: Duration::from_secs(parse(&lookup, "COLLOQUY_HEARTBEAT_SECS", 15)?),
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "COLLOQUY_HOST",
            value: raw,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.namespace, "/chat");
        assert_eq!(config.bus_capacity, 1024);
        assert_eq!(config.heartbeat, Duration::from_secs(15));
        assert!(config.uses_dev_secret());
        assert_eq!(config.addr().unwrap().port(), 3000);
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("COLLOQUY_PORT", "8080"),
            ("COLLOQUY_NAMESPACE", "/team"),
            ("COLLOQUY_JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.namespace, "/team");
        assert!(!config.uses_dev_secret());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = config(&[("COLLOQUY_BUS_CAPACITY", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "COLLOQUY_BUS_CAPACITY", .. }
        ));
    }
}
