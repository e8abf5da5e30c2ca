//! Company creation with a lookup between attempts
//!
//! A create is not idempotent. When a failure leaves it unknown whether the
//! record was written (transport error or 5xx), the next attempt is only made
//! after a fresh lookup by location key shows no parent yet. A 429 is a
//! definite rejection and is retried directly.

use async_trait::async_trait;
use log::{info, warn};

use super::error::ApiError;
use super::resilience::{RetryPolicy, RetryableError};
use crate::services::reconcile::ParentCompany;

/// The two remote calls a guarded create is made of
#[async_trait]
pub trait CreateCalls: Sync {
    /// One create request, no retries
    async fn create_once(&self, name: &str, location_key: &str) -> Result<ParentCompany, ApiError>;

    async fn parents_with_key(&self, location_key: &str) -> Result<Vec<ParentCompany>, ApiError>;
}

/// Create a parent, retrying per `retry` without ever creating it twice.
///
/// More than one parent seen after an interrupted create is reported as
/// [`ApiError::DuplicateMatch`] rather than picking one.
pub async fn create_guarded<C: CreateCalls + ?Sized>(
    calls: &C,
    retry: &RetryPolicy,
    name: &str,
    location_key: &str,
) -> Result<ParentCompany, ApiError> {
    let max_attempts = retry.max_attempts();
    let mut attempt = 1;

    loop {
        let error = match calls.create_once(name, location_key).await {
            Ok(parent) => return Ok(parent),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Err(error);
        }

        let delay = retry.delay_for(attempt, &error);
        warn!(
            "company create failed (attempt {}/{}), retrying in {:?}: {}",
            attempt, max_attempts, delay, error
        );
        tokio::time::sleep(delay).await;

        if error.is_ambiguous() {
            let mut existing = calls.parents_with_key(location_key).await?;
            if existing.len() > 1 {
                let mut parent_ids: Vec<String> =
                    existing.iter().filter_map(|p| p.id.clone()).collect();
                parent_ids.sort();
                return Err(ApiError::DuplicateMatch {
                    location_key: location_key.to_string(),
                    parent_ids,
                });
            }
            if let Some(parent) = existing.pop() {
                info!(
                    "Parent {} for '{}' exists after an interrupted create",
                    parent.id_or_placeholder(),
                    location_key
                );
                return Ok(parent);
            }
        }

        attempt += 1;
    }
}
