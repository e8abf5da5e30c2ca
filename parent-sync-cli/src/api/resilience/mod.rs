//! Production resilience and hardening features
//!
//! Provides retry policies, rate limiting and request logging settings for
//! HubSpot API interactions. None of this is visible to the reconciliation
//! core, which sees a plain call contract.

pub mod config;
pub mod rate_limiter;
pub mod retry;

pub use config::{MonitoringConfig, RateLimitConfig, ResilienceConfig, ResilienceConfigBuilder};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use retry::{RetryConfig, RetryPolicy, RetryableError};
