//! Error type returned by every CRM facade call

use serde::Serialize;
use std::time::Duration;

use super::resilience::RetryableError;

/// Longest response body excerpt kept in an error message
const MAX_BODY_EXCERPT: usize = 512;

/// Failure of a single remote CRM call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    /// The addressed record does not exist (HTTP 404)
    NotFound { resource: String },
    /// Transport failure or non-success HTTP status
    Remote {
        /// HTTP status, `None` when the request never produced a response
        status: Option<u16>,
        message: String,
        /// Server-provided `Retry-After` hint, in seconds
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// The response arrived but could not be mapped onto the expected shape
    Decode { context: String, message: String },
    /// A lookup after an interrupted create found more than one parent
    DuplicateMatch {
        location_key: String,
        parent_ids: Vec<String>,
    },
}

impl ApiError {
    /// Build an error from a non-success HTTP response
    pub fn from_status(status: u16, resource: &str, body: &str, retry_after_secs: Option<u64>) -> Self {
        if status == 404 {
            return ApiError::NotFound {
                resource: resource.to_string(),
            };
        }

        ApiError::Remote {
            status: Some(status),
            message: format!("{} returned {}: {}", resource, status, excerpt(body)),
            retry_after_secs,
        }
    }

    /// Build an error from a reqwest transport failure
    pub fn from_transport(resource: &str, error: &reqwest::Error) -> Self {
        ApiError::Remote {
            status: error.status().map(|s| s.as_u16()),
            message: format!("{} failed: {}", resource, error),
            retry_after_secs: None,
        }
    }

    pub fn decode(context: impl Into<String>, error: impl std::fmt::Display) -> Self {
        ApiError::Decode {
            context: context.into(),
            message: error.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Whether the server may have applied the request before the failure surfaced.
    ///
    /// Transport errors and 5xx responses leave the outcome of a write unknown;
    /// a 429 or any 4xx is a definite rejection.
    pub fn is_ambiguous(&self) -> bool {
        match self {
            ApiError::Remote { status: None, .. } => true,
            ApiError::Remote {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }
}

impl RetryableError for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Remote { status: None, .. } => true,
            ApiError::Remote {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Remote {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound { resource } => write!(f, "Not found: {}", resource),
            ApiError::Remote { message, .. } => write!(f, "Remote error: {}", message),
            ApiError::Decode { context, message } => {
                write!(f, "Unexpected response from {}: {}", context, message)
            }
            ApiError::DuplicateMatch {
                location_key,
                parent_ids,
            } => write!(
                f,
                "Companies {} all carry location key '{}' after an interrupted create",
                parent_ids.join(", "),
                location_key
            ),
        }
    }
}

impl std::error::Error for ApiError {}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_EXCERPT {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_maps_to_not_found() {
        let err = ApiError::from_status(404, "/crm/v3/objects/companies/7", "", None);
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_is_retryable_but_not_ambiguous() {
        let err = ApiError::from_status(429, "/crm/v3/objects/companies", "slow down", Some(2));
        assert!(err.is_retryable());
        assert!(!err.is_ambiguous());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_server_error_is_ambiguous() {
        let err = ApiError::from_status(502, "/crm/v3/objects/companies", "bad gateway", None);
        assert!(err.is_retryable());
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_client_error_is_final() {
        let err = ApiError::from_status(400, "/crm/v3/objects/companies", "{\"message\":\"bad\"}", None);
        assert!(!err.is_retryable());
        assert!(!err.is_ambiguous());
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn test_duplicate_match_is_final() {
        let err = ApiError::DuplicateMatch {
            location_key: "21".to_string(),
            parent_ids: vec!["500".to_string(), "501".to_string()],
        };
        assert!(!err.is_retryable());
        assert!(!err.is_ambiguous());
        assert!(err.to_string().contains("500, 501"));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(500, "/x", &body, None);
        match err {
            ApiError::Remote { message, .. } => assert!(message.len() < 600),
            other => panic!("unexpected {:?}", other),
        }
    }
}
