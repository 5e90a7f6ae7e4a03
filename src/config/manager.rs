//! Configuration Manager

use super::{Config, ProxyKind};
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load the layered configuration: defaults, then `DUALPROXY_*`
    /// variables, then the config file if it exists.
    pub fn load(path: &Path) -> Result<Config> {
        let mut base = Config::default();
        Self::apply_env(&mut base)?;
        Self::load_over(path, base)
    }

    /// Overlay the keys present in the file onto `base`
    fn load_over(path: &Path, base: Config) -> Result<Config> {
        if !path.exists() {
            tracing::warn!("Configuration file not found at {}, using environment and defaults", path.display());
            base.validate()?;
            return Ok(base);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let file: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let mut merged = toml::Value::try_from(&base)
            .context("Failed to encode base configuration")?;
        merge_values(&mut merged, file);

        let config: Config = merged
            .try_into()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        config.validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Overlay any `DUALPROXY_*` variables present in the environment
    pub fn apply_env(config: &mut Config) -> Result<()> {
        if let Ok(host) = std::env::var("DUALPROXY_BIND_HOST") {
            config.server.bind_host = host;
        }

        if let Ok(port) = std::env::var("DUALPROXY_PORT") {
            config.server.port = port.parse::<u16>()
                .with_context(|| format!("Invalid DUALPROXY_PORT: {}", port))?;
        }

        if let Ok(kind) = std::env::var("DUALPROXY_PROXY_TYPE") {
            config.server.proxy_type = kind.parse::<ProxyKind>()
                .with_context(|| format!("Invalid DUALPROXY_PROXY_TYPE: {}", kind))?;
        }

        if let Ok(timeout) = std::env::var("DUALPROXY_CONNECT_TIMEOUT") {
            config.server.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid DUALPROXY_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(log_level) = std::env::var("DUALPROXY_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        Ok(())
    }
}

/// Recursively replace the keys of `base` with those present in `overlay`
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.bind_host.trim().is_empty() {
            bail!("bind_host must not be empty");
        }

        if self.server.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.server.connect_timeout.as_secs() > 300 {
            bail!("connect_timeout cannot exceed 5 minutes");
        }

        if self.server.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.server.buffer_size < 512 {
            bail!("buffer_size must be at least 512 bytes");
        }

        if self.server.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        if self.server.backlog == 0 {
            bail!("backlog must be greater than 0");
        }

        if self.server.max_header_size < 1024 {
            bail!("max_header_size must be at least 1024 bytes");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        if self.monitoring.stats_interval.is_zero() {
            bail!("monitoring.stats_interval must be greater than 0");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        proxy_type: Option<&str>,
        no_management: bool,
    ) -> Result<()> {
        if let Some(host) = bind {
            self.server.bind_host = host.to_string();
            tracing::info!("CLI override: bind host set to {}", host);
        }

        if let Some(port) = port {
            self.server.port = port;
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(kind) = proxy_type {
            self.server.proxy_type = kind.parse()
                .with_context(|| format!("Invalid --proxy-type: {}", kind))?;
            tracing::info!("CLI override: proxy type set to {}", self.server.proxy_type);
        }

        if no_management {
            self.monitoring.management_api.enabled = false;
            tracing::info!("CLI override: management API disabled");
        }

        Ok(())
    }
}
