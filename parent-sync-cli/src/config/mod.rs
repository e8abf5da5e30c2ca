//! Configuration: optional TOML file plus environment overrides
//!
//! Every key has a default, so running without a config file is the normal
//! case. Unknown keys are rejected to catch typos in property names.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{
    AssociationTypes, CrmSchema, DEFAULT_BASE_URL, PropertyNames, RateLimitConfig,
    ResilienceConfig, RetryConfig,
};

pub const ACCESS_TOKEN_ENV: &str = "HUBSPOT_API_ACCESS_TOKEN";
pub const BASE_URL_ENV: &str = "HUBSPOT_BASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub hubspot: HubSpotSettings,
    pub properties: PropertyNames,
    pub associations: AssociationTypes,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubSpotSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HubSpotSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            backoff_multiplier: retry.backoff_multiplier,
            jitter: retry.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub burst_capacity: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let limit = RateLimitConfig::default();
        Self {
            enabled: limit.enabled,
            requests_per_window: limit.requests_per_window,
            window_secs: limit.window.as_secs(),
            burst_capacity: limit.burst_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringSettings {
    pub request_logging: bool,
    pub log_bodies: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            request_logging: true,
            log_bodies: false,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        if let Some(base_url) = std::env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()) {
            config.hubspot.base_url = base_url.trim().to_string();
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.hubspot.timeout_secs == 0 {
            anyhow::bail!("hubspot.timeout_secs must be greater than zero");
        }
        if self.api.retry.max_attempts == 0 {
            anyhow::bail!("api.retry.max_attempts must be at least 1");
        }
        if self.api.rate_limit.enabled
            && (self.api.rate_limit.requests_per_window == 0 || self.api.rate_limit.window_secs == 0)
        {
            anyhow::bail!("api.rate_limit needs a non-zero requests_per_window and window_secs");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.hubspot.timeout_secs)
    }

    pub fn schema(&self) -> CrmSchema {
        CrmSchema {
            properties: self.properties.clone(),
            associations: self.associations.clone(),
        }
    }

    /// Resilience settings; `verbose` also logs response bodies
    pub fn resilience(&self, verbose: bool) -> ResilienceConfig {
        let retry = &self.api.retry;
        let limit = &self.api.rate_limit;

        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: retry.max_attempts,
                base_delay: Duration::from_millis(retry.base_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                backoff_multiplier: retry.backoff_multiplier,
                jitter: retry.jitter,
            })
            .rate_limit_config(RateLimitConfig {
                requests_per_window: limit.requests_per_window,
                window: Duration::from_secs(limit.window_secs),
                burst_capacity: limit.burst_capacity,
                enabled: limit.enabled,
            })
            .request_logging(self.api.monitoring.request_logging)
            .log_bodies(self.api.monitoring.log_bodies || verbose)
            .build()
    }
}

/// `<config_dir>/parent-sync/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parent-sync").join("config.toml"))
}

/// Pick the access token: command line first, then environment
pub fn resolve_access_token(cli: Option<String>, env: Option<String>) -> Result<String> {
    cli.into_iter()
        .chain(env)
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
        .with_context(|| {
            format!(
                "No HubSpot access token: pass --api-access-token or set {} (a .env file works too)",
                ACCESS_TOKEN_ENV
            )
        })
}
