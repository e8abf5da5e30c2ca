//! Error taxonomy of the reconciliation core

use serde::Serialize;

use crate::api::ApiError;

/// The operator called the tool in a way that cannot be acted on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageError {
    EmptyLocationKey,
    NoChildrenFound { location_key: String },
}

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageError::EmptyLocationKey => write!(f, "Location key must not be empty"),
            UsageError::NoChildrenFound { location_key } => write!(
                f,
                "No child companies found with Client Parent Company ID '{}'",
                location_key
            ),
        }
    }
}

impl std::error::Error for UsageError {}

/// The children's imported names do not determine a single parent name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameConflict {
    /// No child carries a non-empty imported name
    NoSourceName { child_ids: Vec<String> },
    /// Children disagree; candidates are sorted and distinct
    Ambiguous { candidates: Vec<String> },
}

impl std::fmt::Display for NameConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameConflict::NoSourceName { child_ids } => write!(
                f,
                "None of the child companies ({}) has an Imported Company Name",
                child_ids.join(", ")
            ),
            NameConflict::Ambiguous { candidates } => write!(
                f,
                "Child companies disagree on the Imported Company Name: {}",
                candidates
                    .iter()
                    .map(|c| format!("'{}'", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl std::error::Error for NameConflict {}

/// CRM state the tool will not correct on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIntegrityError {
    /// More than one company carries the same Client Company Location ID
    DuplicateParent {
        location_key: String,
        parent_ids: Vec<String>,
    },
    /// The parent is linked to a company that is itself a parent record
    ForeignParentLink {
        parent_id: String,
        company_id: String,
        company_location_key: String,
    },
}

impl std::fmt::Display for DataIntegrityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataIntegrityError::DuplicateParent {
                location_key,
                parent_ids,
            } => write!(
                f,
                "Multiple companies ({}) have Client Company Location ID '{}'; expected zero or one",
                parent_ids.join(", "),
                location_key
            ),
            DataIntegrityError::ForeignParentLink {
                parent_id,
                company_id,
                company_location_key,
            } => write!(
                f,
                "Parent {} is linked to company {}, which is the parent record of location '{}'; resolve manually",
                parent_id, company_id, company_location_key
            ),
        }
    }
}

impl std::error::Error for DataIntegrityError {}

/// Terminal error of a reconciliation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", content = "detail", rename_all = "snake_case")]
pub enum ReconcileError {
    Usage(UsageError),
    NameConflict(NameConflict),
    DataIntegrity(DataIntegrityError),
    Api(ApiError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Usage(err) => write!(f, "{}", err),
            ReconcileError::NameConflict(err) => write!(f, "{}", err),
            ReconcileError::DataIntegrity(err) => write!(f, "{}", err),
            ReconcileError::Api(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Usage(err) => Some(err),
            ReconcileError::NameConflict(err) => Some(err),
            ReconcileError::DataIntegrity(err) => Some(err),
            ReconcileError::Api(err) => Some(err),
        }
    }
}

impl From<UsageError> for ReconcileError {
    fn from(err: UsageError) -> Self {
        ReconcileError::Usage(err)
    }
}

impl From<NameConflict> for ReconcileError {
    fn from(err: NameConflict) -> Self {
        ReconcileError::NameConflict(err)
    }
}

impl From<DataIntegrityError> for ReconcileError {
    fn from(err: DataIntegrityError) -> Self {
        ReconcileError::DataIntegrity(err)
    }
}

impl From<ApiError> for ReconcileError {
    fn from(err: ApiError) -> Self {
        ReconcileError::Api(err)
    }
}
