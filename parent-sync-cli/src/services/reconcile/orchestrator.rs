//! Runs the reconciliation stages in order for one location key

use log::{info, warn};

use super::associations::AssociationReconciler;
use super::error::{ReconcileError, UsageError};
use super::facade::CrmFacade;
use super::models::{ChildCompany, ReconciliationResult, RunMode, Stage, StageFailure};
use super::name::resolve_name;
use super::parent::ParentResolver;

pub struct Orchestrator<'a, C: CrmFacade + ?Sized> {
    crm: &'a C,
    mode: RunMode,
}

impl<'a, C: CrmFacade + ?Sized> Orchestrator<'a, C> {
    pub fn new(crm: &'a C, mode: RunMode) -> Self {
        Self { crm, mode }
    }

    /// Reconcile the parent and its links for `location_key`.
    ///
    /// Never fails: a terminal error is recorded in the result together with
    /// the stage it happened in, and nothing after that stage runs.
    pub async fn run(&self, location_key: &str) -> ReconciliationResult {
        let location_key = location_key.trim();
        let mut result = ReconciliationResult::new(location_key, self.mode);

        info!(
            "Reconciling location key '{}'{}",
            location_key,
            if self.mode.is_dry_run() { " (dry run)" } else { "" }
        );

        if let Err(failure) = self.run_stages(location_key, &mut result).await {
            warn!("{}", failure);
            result.error = Some(failure);
            return result;
        }

        result.completed_stage = Some(Stage::Report);
        info!(
            "Location key '{}' done: {} added, {} removed, {} edge failures",
            location_key,
            result.additions(),
            result.removals(),
            result.edge_failures().len()
        );
        result
    }

    async fn run_stages(
        &self,
        location_key: &str,
        result: &mut ReconciliationResult,
    ) -> Result<(), StageFailure> {
        let at = |stage: Stage| move |err: ReconcileError| StageFailure::new(stage, location_key, err);

        let children = self
            .fetch_children(location_key)
            .await
            .map_err(at(Stage::FetchChildren))?;
        result.child_ids = children.iter().map(|c| c.id.clone()).collect();
        result.completed_stage = Some(Stage::FetchChildren);

        let name = resolve_name(&children)
            .map_err(ReconcileError::from)
            .map_err(at(Stage::ResolveName))?;
        info!("Parent name for '{}' resolved to '{}'", location_key, name);
        result.resolved_name = Some(name.clone());
        result.completed_stage = Some(Stage::ResolveName);

        let resolution = ParentResolver::new(self.crm, self.mode)
            .resolve(location_key, &name)
            .await
            .map_err(at(Stage::ResolveParent))?;
        let mut parent = resolution.parent;
        result.parent_id = parent.id.clone();
        result.parent_action = Some(resolution.action);
        result.completed_stage = Some(Stage::ResolveParent);

        let diff = AssociationReconciler::new(self.crm, self.mode)
            .reconcile(&mut parent, &children)
            .await
            .map_err(at(Stage::ReconcileAssociations))?;
        result.associations = Some(diff);
        result.completed_stage = Some(Stage::ReconcileAssociations);

        Ok(())
    }

    async fn fetch_children(&self, location_key: &str) -> Result<Vec<ChildCompany>, ReconcileError> {
        if location_key.is_empty() {
            return Err(UsageError::EmptyLocationKey.into());
        }

        let fetched = self.crm.fetch_children_by_location_key(location_key).await?;
        let total = fetched.len();
        let children: Vec<ChildCompany> = fetched
            .into_iter()
            .filter(|c| c.client_parent_company_id.trim() == location_key)
            .collect();
        if children.len() != total {
            warn!(
                "Ignored {} companies returned for '{}' with a different Client Parent Company ID",
                total - children.len(),
                location_key
            );
        }

        if children.is_empty() {
            return Err(UsageError::NoChildrenFound {
                location_key: location_key.to_string(),
            }
            .into());
        }

        info!("Found {} child companies for '{}'", children.len(), location_key);
        Ok(children)
    }
}
