//! Parent/child company reconciliation by location key
//!
//! One run takes a "Client Company Location ID", finds every company that
//! points at it, derives the parent's name, makes sure exactly one parent
//! record exists and leaves the parent linked to exactly that group.

pub mod associations;
pub mod error;
pub mod facade;
pub mod models;
pub mod name;
pub mod orchestrator;
pub mod parent;

#[cfg(test)]
pub mod testing;

pub use associations::AssociationReconciler;
pub use error::{DataIntegrityError, NameConflict, ReconcileError, UsageError};
pub use facade::CrmFacade;
pub use models::{
    AssociationDiffResult, AssociationEdge, ChildCompany, CompanyId, CompanySnapshot, EdgeError,
    EdgeFailure, EdgeOperation, ParentAction, ParentCompany, ReconciliationResult, RetainReason,
    RetainedLink, RunMode, Stage, StageFailure, PLANNED_PARENT_ID,
};
pub use name::resolve_name;
pub use orchestrator::Orchestrator;
pub use parent::{ParentResolution, ParentResolver};
