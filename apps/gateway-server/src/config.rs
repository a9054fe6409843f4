//! Server configuration from `ROBOT_GATEWAY_*` environment variables.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result, bail};
use robot_gateway_core::{GatewayConfig, StaticIdentity};
use robot_gateway_driver::link::DEFAULT_PORT;

const PREFIX: &str = "ROBOT_GATEWAY_";

/// Robot link selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// In-process simulated robot.
    Sim,
    /// JSON-lines TCP bridge on the robot.
    Tcp,
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sim" => Ok(Self::Sim),
            "tcp" => Ok(Self::Tcp),
            other => bail!("unknown transport {other:?} (expected sim or tcp)"),
        }
    }
}

/// Operation log backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStoreKind {
    Memory,
    /// SQLite database URL.
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub transport: TransportKind,
    pub robot_port: u16,
    /// Allowed CORS origin; any origin when unset.
    pub cors_origin: Option<String>,
    pub identity: StaticIdentity,
    pub log_store: LogStoreKind,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, keyed by full variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{PREFIX}{name}")).filter(|v| !v.is_empty());

        let mut gateway = GatewayConfig::default();
        if let Some(ms) = parse::<u64>(&var, "CONNECT_TIMEOUT_MS")? {
            gateway.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&var, "COMMAND_TIMEOUT_MS")? {
            gateway.command_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&var, "FETCH_TIMEOUT_MS")? {
            gateway.fetch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&var, "HEARTBEAT_INTERVAL_MS")? {
            gateway.heartbeat_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(limit) = parse(&var, "HEARTBEAT_FAILURES")? {
            gateway.heartbeat_failure_limit = limit;
        }
        if let Some(limit) = parse(&var, "RELAY_FAILURES")? {
            gateway.relay_failure_threshold = limit;
        }

        let identity = match var("TOKENS") {
            Some(table) => StaticIdentity::parse(&table).context("invalid ROBOT_GATEWAY_TOKENS")?,
            None => StaticIdentity::new(),
        };

        let log_store = match var("LOG_STORE").as_deref() {
            None | Some("memory") => LogStoreKind::Memory,
            Some(url) if url.starts_with("sqlite:") => LogStoreKind::Sqlite(url.to_string()),
            Some(other) => bail!("unsupported ROBOT_GATEWAY_LOG_STORE {other:?}"),
        };

        Ok(Self {
            bind: parse(&var, "BIND")?.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000))),
            transport: parse(&var, "TRANSPORT")?.unwrap_or(TransportKind::Sim),
            robot_port: parse(&var, "ROBOT_PORT")?.unwrap_or(DEFAULT_PORT),
            cors_origin: var("CORS_ORIGIN"),
            identity,
            log_store,
            gateway,
        })
    }
}

fn parse<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {PREFIX}{name} {raw:?}: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = assert_ok!(config(&[]));
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.transport, TransportKind::Sim);
        assert_eq!(config.robot_port, DEFAULT_PORT);
        assert_eq!(config.log_store, LogStoreKind::Memory);
        assert!(config.identity.is_empty());
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = assert_ok!(config(&[
            ("BIND", "0.0.0.0:8080"),
            ("TRANSPORT", "tcp"),
            ("TOKENS", "t1:alice:admin,t2:bob:operator"),
            ("LOG_STORE", "sqlite://gateway.db"),
            ("COMMAND_TIMEOUT_MS", "2500"),
            ("HEARTBEAT_FAILURES", "0"),
        ]));
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.identity.len(), 2);
        assert_eq!(
            config.log_store,
            LogStoreKind::Sqlite("sqlite://gateway.db".into())
        );
        assert_eq!(config.gateway.command_timeout, Duration::from_millis(2500));
        assert_eq!(config.gateway.heartbeat_failure_limit, 0);
    }

    #[test]
    fn test_fails_fast_on_bad_values() {
        assert_err!(config(&[("TRANSPORT", "serial")]));
        assert_err!(config(&[("ROBOT_PORT", "99999")]));
        assert_err!(config(&[("TOKENS", "t1:alice:root")]));
        assert_err!(config(&[("LOG_STORE", "postgres://db")]));
        let err = config(&[("FETCH_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("ROBOT_GATEWAY_FETCH_TIMEOUT_MS"));
    }
}
