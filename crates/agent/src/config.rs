//! Sampler configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use telemetry_lib::StoreConfig;

/// Sampler configuration, read once at startup from `TELEMETRY_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Namespace sampled every cycle
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Sampling interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Cluster API base URL; inferred from kubeconfig or the pod environment when unset
    #[serde(default)]
    pub cluster_url: Option<String>,

    /// Bearer token file for the cluster API
    #[serde(default)]
    pub cluster_token_file: Option<String>,

    #[serde(default)]
    pub cluster_accept_invalid_certs: bool,

    #[serde(default = "default_db_host")]
    pub db_host: String,

    #[serde(default = "default_db_port")]
    pub db_port: u16,

    #[serde(default = "default_db_user")]
    pub db_user: String,

    #[serde(default)]
    pub db_password: String,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_interval() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "telemetry".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TELEMETRY").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let parsed: AgentConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be greater than zero");
        }
        if self.namespace.trim().is_empty() {
            anyhow::bail!("namespace must not be empty");
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("db_max_connections must be greater than zero");
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.db_name.clone(),
            max_connections: self.db_max_connections,
            ..StoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<AgentConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        AgentConfig::from_config(builder.build().unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]).unwrap();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.sampling_interval(), Duration::from_secs(30));
        assert_eq!(config.api_port, 8080);
        assert!(config.cluster_url.is_none());
        assert!(!config.cluster_accept_invalid_certs);

        let store = config.store_config();
        assert_eq!(store.host, "localhost");
        assert_eq!(store.port, 5432);
        assert_eq!(store.database, "telemetry");
        assert_eq!(store.max_connections, 5);
    }

    #[test]
    fn test_overrides() {
        let config = build(&[
            ("namespace", "prod"),
            ("interval_secs", "15"),
            ("db_host", "db.internal"),
            ("cluster_url", "https://10.0.0.1:6443"),
        ])
        .unwrap();
        assert_eq!(config.namespace, "prod");
        assert_eq!(config.interval_secs, 15);
        assert_eq!(config.store_config().host, "db.internal");
        assert_eq!(config.cluster_url.as_deref(), Some("https://10.0.0.1:6443"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(build(&[("interval_secs", "0")]).is_err());
        assert!(build(&[("interval_secs", "soon")]).is_err());
        assert!(build(&[("namespace", " ")]).is_err());
    }
}
