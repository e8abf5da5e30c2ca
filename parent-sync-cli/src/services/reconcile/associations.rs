//! Association diff between the CRM and the location-key grouping
//!
//! The desired state is "the parent is linked to exactly the companies that
//! carry its location key". The current state is always read fresh. Extra
//! links are only removed when the linked company proves to be outside the
//! group; anything else is reported and left alone.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use super::error::{DataIntegrityError, ReconcileError};
use super::facade::CrmFacade;
use super::models::{
    AssociationDiffResult, AssociationEdge, ChildCompany, CompanyId, EdgeError, EdgeFailure,
    EdgeOperation, ParentCompany, RetainReason, RetainedLink, RunMode,
};

/// Verdict on a link the parent has but the group does not explain
enum LinkVerdict {
    Stale,
    Retain(RetainReason),
    Failed(EdgeError),
}

pub struct AssociationReconciler<'a, C: CrmFacade + ?Sized> {
    crm: &'a C,
    mode: RunMode,
}

impl<'a, C: CrmFacade + ?Sized> AssociationReconciler<'a, C> {
    pub fn new(crm: &'a C, mode: RunMode) -> Self {
        Self { crm, mode }
    }

    /// Bring the parent's links in line with `children`.
    ///
    /// Only reading the parent's current links can fail the stage; every
    /// per-edge problem is collected in the result. On return
    /// `parent.associated_child_ids` holds the links as they now stand.
    pub async fn reconcile(
        &self,
        parent: &mut ParentCompany,
        children: &[ChildCompany],
    ) -> Result<AssociationDiffResult, ReconcileError> {
        let current = match &parent.id {
            Some(id) => self.crm.list_associated_children(id).await?,
            None => BTreeSet::new(),
        };
        debug!(
            "Parent {} currently linked to {} companies",
            parent.id_or_placeholder(),
            current.len()
        );

        let mut result = AssociationDiffResult::default();
        let detaches = self.plan(parent, children, &current, &mut result).await;

        info!(
            "Association plan for parent {}: {} to add, {} to remove, {} retained, {} failed checks",
            parent.id_or_placeholder(),
            result.to_add.len(),
            result.to_remove.len(),
            result.retained.len(),
            result.failures.len()
        );

        if self.mode.is_dry_run() {
            parent.associated_child_ids = current;
            return Ok(result);
        }

        self.apply(parent.id_or_placeholder(), &detaches, &mut result).await;
        result.applied = true;

        let parent_id = parent.id_or_placeholder().to_string();
        let mut linked = current;
        for edge in result.removed.iter().filter(|e| e.parent_id == parent_id) {
            linked.remove(&edge.child_id);
        }
        for edge in &result.added {
            linked.insert(edge.child_id.clone());
        }
        parent.associated_child_ids = linked;

        Ok(result)
    }

    /// Fill `to_add`, `to_remove`, `retained` and check failures.
    ///
    /// Returns the children that first need detaching from another parent,
    /// keyed by child id.
    async fn plan(
        &self,
        parent: &ParentCompany,
        children: &[ChildCompany],
        current: &BTreeSet<CompanyId>,
        result: &mut AssociationDiffResult,
    ) -> BTreeMap<CompanyId, CompanyId> {
        let parent_id = parent.id_or_placeholder();
        let desired: BTreeSet<&str> = children.iter().map(|c| c.id.as_str()).collect();

        for company_id in current.iter().filter(|id| !desired.contains(id.as_str())) {
            let edge = AssociationEdge::new(parent_id, company_id.as_str());
            match self.classify_extra_link(parent, company_id).await {
                LinkVerdict::Stale => {
                    debug!("Link {} is stale", edge);
                    result.to_remove.push(edge);
                }
                LinkVerdict::Retain(reason) => {
                    warn!("Keeping link {}: {:?}", edge, reason);
                    result.retained.push(RetainedLink { edge, reason });
                }
                LinkVerdict::Failed(error) => {
                    warn!("Cannot verify link {}: {}", edge, error);
                    result.failures.push(EdgeFailure {
                        edge,
                        operation: EdgeOperation::Remove,
                        error,
                    });
                }
            }
        }

        let mut detaches = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for child in children {
            if current.contains(&child.id) || !seen.insert(child.id.as_str()) {
                continue;
            }

            // A company has at most one parent: free it before linking it here
            if let Some(other) = child
                .current_associated_parent_id
                .as_deref()
                .filter(|other| parent.id.as_deref() != Some(*other))
            {
                debug!("Child {} is linked to parent {} and will be moved", child.id, other);
                result
                    .to_remove
                    .push(AssociationEdge::new(other, child.id.as_str()));
                detaches.insert(child.id.clone(), other.to_string());
            }

            result
                .to_add
                .push(AssociationEdge::new(parent_id, child.id.as_str()));
        }

        detaches
    }

    async fn classify_extra_link(&self, parent: &ParentCompany, company_id: &str) -> LinkVerdict {
        let company = match self.crm.fetch_company(company_id).await {
            Ok(company) => company,
            Err(err) if err.is_not_found() => {
                return LinkVerdict::Retain(RetainReason::CompanyNotFound);
            }
            Err(err) => return LinkVerdict::Failed(EdgeError::Api(err)),
        };

        if let Some(owned_key) = company.location_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return LinkVerdict::Failed(EdgeError::DataIntegrity(
                DataIntegrityError::ForeignParentLink {
                    parent_id: parent.id_or_placeholder().to_string(),
                    company_id: company_id.to_string(),
                    company_location_key: owned_key.to_string(),
                },
            ));
        }

        if company.client_parent_company_id.as_deref().map(str::trim) == Some(parent.location_key.as_str()) {
            return LinkVerdict::Retain(RetainReason::StillInGroup);
        }

        LinkVerdict::Stale
    }

    /// Removals first, then additions; each edge is its own call
    async fn apply(
        &self,
        parent_id: &str,
        detaches: &BTreeMap<CompanyId, CompanyId>,
        result: &mut AssociationDiffResult,
    ) {
        let mut failed_detaches: BTreeSet<CompanyId> = BTreeSet::new();

        for edge in &result.to_remove {
            match self
                .crm
                .remove_association(&edge.parent_id, &edge.child_id)
                .await
            {
                Ok(()) => {
                    debug!("Removed link {}", edge);
                    result.removed.push(edge.clone());
                }
                Err(err) => {
                    warn!("Failed to remove link {}: {}", edge, err);
                    if edge.parent_id != parent_id {
                        failed_detaches.insert(edge.child_id.clone());
                    }
                    result.failures.push(EdgeFailure {
                        edge: edge.clone(),
                        operation: EdgeOperation::Remove,
                        error: EdgeError::Api(err),
                    });
                }
            }
        }

        for edge in &result.to_add {
            if failed_detaches.contains(&edge.child_id) {
                let other_parent_id = detaches.get(&edge.child_id).cloned().unwrap_or_default();
                warn!("Skipping link {}: child is still linked to {}", edge, other_parent_id);
                result.failures.push(EdgeFailure {
                    edge: edge.clone(),
                    operation: EdgeOperation::Add,
                    error: EdgeError::DetachFailed { other_parent_id },
                });
                continue;
            }

            match self.crm.add_association(&edge.parent_id, &edge.child_id).await {
                Ok(()) => {
                    debug!("Added link {}", edge);
                    result.added.push(edge.clone());
                }
                Err(err) => {
                    warn!("Failed to add link {}: {}", edge, err);
                    result.failures.push(EdgeFailure {
                        edge: edge.clone(),
                        operation: EdgeOperation::Add,
                        error: EdgeError::Api(err),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::reconcile::testing::{InMemoryCrm, StoredCompany, Write};

    async fn children_of_key(crm: &InMemoryCrm, key: &str) -> Vec<ChildCompany> {
        crm.fetch_children_by_location_key(key).await.unwrap()
    }

    async fn parent(crm: &InMemoryCrm, key: &str) -> ParentCompany {
        crm.fetch_parents_by_location_key(key)
            .await
            .unwrap()
            .pop()
            .unwrap()
    }

    #[tokio::test]
    async fn test_links_missing_children() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());
        assert!(diff.failures.is_empty());
        assert!(diff.applied);
        assert_eq!(crm.children_of("500"), ["1", "2"].iter().map(|s| s.to_string()).collect());
        assert_eq!(parent.associated_child_ids, crm.children_of("500"));
    }

    #[tokio::test]
    async fn test_removes_stale_link_and_keeps_valid_ones() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co")
            .with_child("3", "22", "Other Co")
            .with_edge("500", "1")
            .with_edge("500", "2")
            .with_edge("500", "3");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert!(diff.to_add.is_empty());
        assert_eq!(diff.removed, vec![AssociationEdge::new("500", "3")]);
        assert_eq!(crm.writes(), vec![Write::Remove(AssociationEdge::new("500", "3"))]);
        assert_eq!(crm.children_of("500").len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co")
            .with_company(
                "3",
                StoredCompany {
                    name: "Detached".to_string(),
                    ..Default::default()
                },
            )
            .with_edge("500", "3");
        let reconciler = AssociationReconciler::new(&crm, RunMode::Apply);

        let children = children_of_key(&crm, "21").await;
        let mut first_parent = parent(&crm, "21").await;
        let first = reconciler.reconcile(&mut first_parent, &children).await.unwrap();
        assert!(!first.is_noop());

        crm.clear_writes();
        let children = children_of_key(&crm, "21").await;
        let mut second_parent = parent(&crm, "21").await;
        let second = reconciler.reconcile(&mut second_parent, &children).await.unwrap();

        assert!(second.is_noop());
        assert!(crm.writes().is_empty());
    }

    #[tokio::test]
    async fn test_child_of_another_parent_is_detached_before_linking() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_parent("600", "99", "Someone Else")
            .with_child("1", "21", "Acme Co")
            .with_edge("600", "1");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert_eq!(
            crm.writes(),
            vec![
                Write::Remove(AssociationEdge::new("600", "1")),
                Write::Add(AssociationEdge::new("500", "1")),
            ]
        );
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
        assert!(crm.children_of("600").is_empty());
        // Detaching from another parent does not touch this parent's link set
        assert_eq!(parent.associated_child_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_detach_skips_the_add() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_parent("600", "99", "Someone Else")
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co")
            .with_edge("600", "1")
            .failing_remove_for("1");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert_eq!(diff.added, vec![AssociationEdge::new("500", "2")]);
        assert_eq!(diff.failures.len(), 2);
        assert_eq!(
            diff.failures[1].error,
            EdgeError::DetachFailed {
                other_parent_id: "600".to_string()
            }
        );
        assert_eq!(crm.children_of("600").len(), 1);
    }

    #[tokio::test]
    async fn test_edge_failures_do_not_abort_the_batch() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co")
            .with_child("3", "21", "Acme Co")
            .failing_add_for("2");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert_eq!(
            diff.added,
            vec![AssociationEdge::new("500", "1"), AssociationEdge::new("500", "3")]
        );
        assert_eq!(diff.failures.len(), 1);
        assert_eq!(diff.failures[0].edge, AssociationEdge::new("500", "2"));
        assert_eq!(diff.failures[0].operation, EdgeOperation::Add);
    }

    #[tokio::test]
    async fn test_link_to_another_parent_record_is_an_integrity_failure() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_parent("700", "30", "Holding")
            .with_child("1", "21", "Acme Co")
            .with_edge("500", "1")
            .with_edge("500", "700");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert!(diff.to_remove.is_empty());
        assert_eq!(
            diff.failures[0].error,
            EdgeError::DataIntegrity(DataIntegrityError::ForeignParentLink {
                parent_id: "500".to_string(),
                company_id: "700".to_string(),
                company_location_key: "30".to_string(),
            })
        );
        assert!(crm.children_of("500").contains("700"));
        assert!(crm.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unverifiable_links_are_retained() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("4", "21", "Acme Co")
            .hiding_child("4")
            .with_edge("500", "1")
            .with_edge("500", "4")
            .with_edge("500", "8")
            .with_edge("500", "9")
            .with_company("9", StoredCompany::default())
            .failing_fetch_of("9");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::Apply)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert!(diff.to_remove.is_empty());
        assert_eq!(
            diff.retained,
            vec![
                RetainedLink {
                    edge: AssociationEdge::new("500", "4"),
                    reason: RetainReason::StillInGroup,
                },
                RetainedLink {
                    edge: AssociationEdge::new("500", "8"),
                    reason: RetainReason::CompanyNotFound,
                },
            ]
        );
        assert_eq!(diff.failures.len(), 1);
        assert!(matches!(diff.failures[0].error, EdgeError::Api(_)));
        assert!(crm.writes().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_only_plans() {
        let crm = InMemoryCrm::new()
            .with_parent("500", "21", "Acme Co")
            .with_child("1", "21", "Acme Co")
            .with_child("3", "22", "Other Co")
            .with_edge("500", "3");
        let children = children_of_key(&crm, "21").await;
        let mut parent = parent(&crm, "21").await;

        let diff = AssociationReconciler::new(&crm, RunMode::DryRun)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert!(!diff.applied);
        assert_eq!(diff.to_add, vec![AssociationEdge::new("500", "1")]);
        assert_eq!(diff.to_remove, vec![AssociationEdge::new("500", "3")]);
        assert!(diff.added.is_empty());
        assert!(crm.writes().is_empty());
    }

    #[tokio::test]
    async fn test_planned_parent_links_every_child() {
        let crm = InMemoryCrm::new()
            .with_child("1", "21", "Acme Co")
            .with_child("2", "21", "Acme Co");
        let children = children_of_key(&crm, "21").await;
        let mut parent = ParentCompany::planned("21", "Acme Co");

        let diff = AssociationReconciler::new(&crm, RunMode::DryRun)
            .reconcile(&mut parent, &children)
            .await
            .unwrap();

        assert_eq!(diff.to_add.len(), 2);
        assert!(diff.to_remove.is_empty());
    }
}
