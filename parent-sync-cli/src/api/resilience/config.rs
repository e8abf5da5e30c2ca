//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry policies, rate limiting,
//! and request logging with sane defaults.

use super::retry::RetryConfig;
use std::time::Duration;

/// Global resilience configuration for CRM API calls
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub monitoring: MonitoringConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    pub burst_capacity: u32,
    pub enabled: bool,
}

/// Request logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Log method, path and status of each request at debug level
    pub request_logging: bool,
    /// Also log raw response bodies (noisy, useful with --verbose)
    pub log_bodies: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100, // HubSpot private app limit
            window: Duration::from_secs(10),
            burst_capacity: 10,
            enabled: true,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            request_logging: true,
            log_bodies: false,
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Disable all resilience features
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::none(),
            rate_limit: RateLimitConfig {
                requests_per_window: u32::MAX,
                window: Duration::from_secs(1),
                burst_capacity: u32::MAX,
                enabled: false,
            },
            monitoring: MonitoringConfig {
                request_logging: false,
                log_bodies: false,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Configure rate limiting
    pub fn rate_limit_config(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    pub fn log_bodies(mut self, enabled: bool) -> Self {
        self.config.monitoring.log_bodies = enabled;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
