use serde::Serialize;
use std::collections::BTreeSet;

use super::error::{DataIntegrityError, ReconcileError};
use crate::api::ApiError;

/// Opaque CRM record identifier
pub type CompanyId = String;

/// Placeholder parent id used when a dry run plans a parent that does not exist yet
pub const PLANNED_PARENT_ID: &str = "<new parent>";

/// A company grouped under a location key through its "Client Parent Company ID"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildCompany {
    pub id: CompanyId,
    pub client_parent_company_id: String,
    /// Empty when the child carries no imported name
    pub imported_company_name: String,
    /// Parent the CRM currently links this child to
    pub current_associated_parent_id: Option<CompanyId>,
}

impl ChildCompany {
    pub fn new(
        id: impl Into<String>,
        client_parent_company_id: impl Into<String>,
        imported_company_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client_parent_company_id: client_parent_company_id.into(),
            imported_company_name: imported_company_name.into(),
            current_associated_parent_id: None,
        }
    }
}

/// The company carrying a location key as its "Client Company Location ID"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentCompany {
    /// `None` only for a parent planned by a dry run
    pub id: Option<CompanyId>,
    pub location_key: String,
    pub name: String,
    pub associated_child_ids: BTreeSet<CompanyId>,
}

impl ParentCompany {
    pub fn new(id: impl Into<String>, location_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            location_key: location_key.into(),
            name: name.into(),
            associated_child_ids: BTreeSet::new(),
        }
    }

    pub fn planned(location_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            location_key: location_key.into(),
            name: name.into(),
            associated_child_ids: BTreeSet::new(),
        }
    }

    /// The CRM id, or the dry-run placeholder
    pub fn id_or_placeholder(&self) -> &str {
        self.id.as_deref().unwrap_or(PLANNED_PARENT_ID)
    }
}

/// Any company record fetched by id, used to justify removing a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanySnapshot {
    pub id: CompanyId,
    /// Set when the company is itself a parent record
    pub location_key: Option<String>,
    /// Set when the company is a child of some location key
    pub client_parent_company_id: Option<String>,
}

/// A parent → child link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssociationEdge {
    pub parent_id: CompanyId,
    pub child_id: CompanyId,
}

impl AssociationEdge {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }
}

impl std::fmt::Display for AssociationEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} -> {})", self.parent_id, self.child_id)
    }
}

/// Linear stages of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchChildren,
    ResolveName,
    ResolveParent,
    ReconcileAssociations,
    Report,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::FetchChildren => "fetch children",
            Stage::ResolveName => "resolve name",
            Stage::ResolveParent => "resolve parent",
            Stage::ReconcileAssociations => "reconcile associations",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether writes are issued or only planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Apply,
    DryRun,
}

impl RunMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

/// What happened (or would happen) to the parent record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ParentAction {
    Unchanged,
    Renamed { previous_name: String },
    Created,
    WouldRename { previous_name: String },
    WouldCreate,
}

impl ParentAction {
    /// Whether a write was actually issued
    pub fn wrote(&self) -> bool {
        matches!(self, ParentAction::Renamed { .. } | ParentAction::Created)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParentAction::Unchanged => "unchanged",
            ParentAction::Renamed { .. } => "renamed",
            ParentAction::Created => "created",
            ParentAction::WouldRename { .. } => "would rename",
            ParentAction::WouldCreate => "would create",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOperation {
    Add,
    Remove,
}

/// Why a single edge could not be brought to its desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EdgeError {
    /// The remote call for this edge failed
    Api(ApiError),
    /// The link points at something the tool refuses to touch
    DataIntegrity(DataIntegrityError),
    /// Not attempted because the child's link to another parent could not be removed first
    DetachFailed { other_parent_id: CompanyId },
}

impl std::fmt::Display for EdgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeError::Api(err) => write!(f, "{}", err),
            EdgeError::DataIntegrity(err) => write!(f, "{}", err),
            EdgeError::DetachFailed { other_parent_id } => write!(
                f,
                "skipped: could not first remove the link to parent {}",
                other_parent_id
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeFailure {
    pub edge: AssociationEdge,
    pub operation: EdgeOperation,
    pub error: EdgeError,
}

/// Why an unexpected link was left in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainReason {
    /// The linked company no longer exists, so it cannot be checked
    CompanyNotFound,
    /// The linked company still carries this location key but was not returned
    /// by the child lookup (search index lag)
    StillInGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedLink {
    pub edge: AssociationEdge,
    pub reason: RetainReason,
}

/// Outcome of the association stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssociationDiffResult {
    /// Planned additions
    pub to_add: Vec<AssociationEdge>,
    /// Planned removals: stale links of this parent, then links of group
    /// members to other parents
    pub to_remove: Vec<AssociationEdge>,
    pub added: Vec<AssociationEdge>,
    pub removed: Vec<AssociationEdge>,
    pub failures: Vec<EdgeFailure>,
    pub retained: Vec<RetainedLink>,
    /// `false` for a dry run
    pub applied: bool,
}

impl AssociationDiffResult {
    /// Nothing to add and nothing to remove
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Terminal error of a run together with where it happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub location_key: String,
    pub error: ReconcileError,
}

impl StageFailure {
    pub fn new(stage: Stage, location_key: &str, error: impl Into<ReconcileError>) -> Self {
        Self {
            stage,
            location_key: location_key.to_string(),
            error: error.into(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' failed for location key '{}': {}",
            self.stage, self.location_key, self.error
        )
    }
}

impl std::error::Error for StageFailure {}

/// Summary of one run for one location key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub location_key: String,
    pub mode: RunMode,
    pub child_ids: Vec<CompanyId>,
    pub resolved_name: Option<String>,
    pub parent_id: Option<CompanyId>,
    pub parent_action: Option<ParentAction>,
    pub associations: Option<AssociationDiffResult>,
    /// Last stage that finished
    pub completed_stage: Option<Stage>,
    pub error: Option<StageFailure>,
}

impl ReconciliationResult {
    pub fn new(location_key: &str, mode: RunMode) -> Self {
        Self {
            location_key: location_key.to_string(),
            mode,
            child_ids: Vec::new(),
            resolved_name: None,
            parent_id: None,
            parent_action: None,
            associations: None,
            completed_stage: None,
            error: None,
        }
    }

    pub fn additions(&self) -> usize {
        self.associations.as_ref().map_or(0, |a| a.added.len())
    }

    pub fn removals(&self) -> usize {
        self.associations.as_ref().map_or(0, |a| a.removed.len())
    }

    pub fn edge_failures(&self) -> &[EdgeFailure] {
        self.associations
            .as_ref()
            .map_or(&[][..], |a| a.failures.as_slice())
    }

    /// No terminal error and no per-edge failure
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.edge_failures().is_empty()
    }

    /// Total writes issued to the CRM during the run
    pub fn write_count(&self) -> usize {
        let parent_writes = self
            .parent_action
            .as_ref()
            .map_or(0, |a| usize::from(a.wrote()));
        parent_writes + self.additions() + self.removals()
    }

    pub fn integrity_failures(&self) -> impl Iterator<Item = &DataIntegrityError> {
        self.edge_failures().iter().filter_map(|f| match &f.error {
            EdgeError::DataIntegrity(err) => Some(err),
            _ => None,
        })
    }
}
