//! HubSpot CRM API module
//!
//! Wire models, error mapping and the resilience layer (retries, rate
//! limiting, request logging) behind a client that implements the
//! reconciliation facade.

pub mod client;
pub mod create;
pub mod error;
pub mod models;
pub mod resilience;
pub mod schema;

pub use client::{DEFAULT_BASE_URL, HubSpotClient};
pub use error::ApiError;
pub use resilience::{
    MonitoringConfig, RateLimitConfig, RateLimiter, RateLimiterStats, ResilienceConfig,
    ResilienceConfigBuilder, RetryConfig, RetryPolicy, RetryableError,
};
pub use schema::{AssociationTypes, CrmSchema, PropertyNames};
