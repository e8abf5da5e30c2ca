//! Contract between the reconciliation core and the CRM

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::models::{ChildCompany, CompanyId, CompanySnapshot, ParentCompany};
use crate::api::ApiError;

/// Remote operations the core needs, expressed in domain types.
///
/// Implementations own authentication, retries and rate limiting. The core
/// awaits each call before issuing the next one.
#[async_trait]
pub trait CrmFacade: Send + Sync {
    /// Companies whose "Client Parent Company ID" equals `location_key`
    async fn fetch_children_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ChildCompany>, ApiError>;

    /// Every company whose "Client Company Location ID" equals `location_key`.
    /// More than one entry is a data anomaly for the caller to report.
    async fn fetch_parents_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ParentCompany>, ApiError>;

    async fn fetch_company(&self, id: &str) -> Result<CompanySnapshot, ApiError>;

    async fn create_company(&self, name: &str, location_key: &str)
    -> Result<ParentCompany, ApiError>;

    async fn update_company_name(&self, id: &str, name: &str) -> Result<(), ApiError>;

    async fn list_associated_children(
        &self,
        parent_id: &str,
    ) -> Result<BTreeSet<CompanyId>, ApiError>;

    async fn add_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError>;

    async fn remove_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError>;
}
