//! In-memory CRM used by the reconciliation tests

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::facade::CrmFacade;
use super::models::{AssociationEdge, ChildCompany, CompanyId, CompanySnapshot, ParentCompany};
use crate::api::ApiError;

#[derive(Debug, Clone, Default)]
pub struct StoredCompany {
    pub name: String,
    pub location_key: Option<String>,
    pub client_parent_company_id: Option<String>,
    pub imported_company_name: Option<String>,
}

/// Every write the fake CRM accepted, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create { id: String, name: String, location_key: String },
    UpdateName { id: String, name: String },
    Add(AssociationEdge),
    Remove(AssociationEdge),
}

#[derive(Debug, Default)]
struct State {
    companies: BTreeMap<CompanyId, StoredCompany>,
    edges: BTreeSet<AssociationEdge>,
    next_id: u64,
    writes: Vec<Write>,
    fail_add: BTreeSet<CompanyId>,
    fail_remove: BTreeSet<CompanyId>,
    fail_fetch_company: BTreeSet<CompanyId>,
    fail_children_fetch: bool,
    fail_create: Option<ApiError>,
    fail_rename: BTreeSet<CompanyId>,
    fail_link_listing: bool,
    hide_children: BTreeSet<CompanyId>,
}

#[derive(Debug, Default)]
pub struct InMemoryCrm {
    state: Mutex<State>,
}

fn remote(message: &str) -> ApiError {
    ApiError::Remote {
        status: Some(503),
        message: message.to_string(),
        retry_after_secs: None,
    }
}

impl InMemoryCrm {
    pub fn new() -> Self {
        let crm = Self::default();
        crm.state.lock().unwrap().next_id = 1000;
        crm
    }

    pub fn with_child(self, id: &str, location_key: &str, imported_name: &str) -> Self {
        self.state.lock().unwrap().companies.insert(
            id.to_string(),
            StoredCompany {
                name: format!("{} branch {}", imported_name, id),
                location_key: None,
                client_parent_company_id: Some(location_key.to_string()),
                imported_company_name: Some(imported_name.to_string()),
            },
        );
        self
    }

    pub fn with_parent(self, id: &str, location_key: &str, name: &str) -> Self {
        self.state.lock().unwrap().companies.insert(
            id.to_string(),
            StoredCompany {
                name: name.to_string(),
                location_key: Some(location_key.to_string()),
                client_parent_company_id: None,
                imported_company_name: None,
            },
        );
        self
    }

    pub fn with_company(self, id: &str, company: StoredCompany) -> Self {
        self.state
            .lock()
            .unwrap()
            .companies
            .insert(id.to_string(), company);
        self
    }

    pub fn with_edge(self, parent_id: &str, child_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .edges
            .insert(AssociationEdge::new(parent_id, child_id));
        self
    }

    pub fn failing_add_for(self, child_id: &str) -> Self {
        self.state.lock().unwrap().fail_add.insert(child_id.to_string());
        self
    }

    pub fn failing_remove_for(self, child_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_remove
            .insert(child_id.to_string());
        self
    }

    pub fn failing_fetch_of(self, company_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_fetch_company
            .insert(company_id.to_string());
        self
    }

    pub fn failing_children_fetch(self) -> Self {
        self.state.lock().unwrap().fail_children_fetch = true;
        self
    }

    /// Make every create return `error` without storing anything
    pub fn failing_create_with(self, error: ApiError) -> Self {
        self.state.lock().unwrap().fail_create = Some(error);
        self
    }

    pub fn failing_rename_of(self, company_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_rename
            .insert(company_id.to_string());
        self
    }

    pub fn failing_link_listing(self) -> Self {
        self.state.lock().unwrap().fail_link_listing = true;
        self
    }

    /// Leave a child out of child lookups, as a lagging search index would
    pub fn hiding_child(self, child_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hide_children
            .insert(child_id.to_string());
        self
    }

    /// Change a company's location grouping between runs
    pub fn set_client_parent(&self, id: &str, location_key: Option<&str>) {
        if let Some(company) = self.state.lock().unwrap().companies.get_mut(id) {
            company.client_parent_company_id = location_key.map(str::to_string);
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn children_of(&self, parent_id: &str) -> BTreeSet<CompanyId> {
        self.state
            .lock()
            .unwrap()
            .edges
            .iter()
            .filter(|e| e.parent_id == parent_id)
            .map(|e| e.child_id.clone())
            .collect()
    }

    pub fn parents_with_key(&self, location_key: &str) -> Vec<(CompanyId, String)> {
        self.state
            .lock()
            .unwrap()
            .companies
            .iter()
            .filter(|(_, c)| c.location_key.as_deref() == Some(location_key))
            .map(|(id, c)| (id.clone(), c.name.clone()))
            .collect()
    }
}

#[async_trait]
impl CrmFacade for InMemoryCrm {
    async fn fetch_children_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ChildCompany>, ApiError> {
        let state = self.state.lock().unwrap();
        if state.fail_children_fetch {
            return Err(remote("search unavailable"));
        }

        Ok(state
            .companies
            .iter()
            .filter(|(id, c)| {
                c.client_parent_company_id.as_deref() == Some(location_key)
                    && !state.hide_children.contains(*id)
            })
            .map(|(id, c)| ChildCompany {
                id: id.clone(),
                client_parent_company_id: location_key.to_string(),
                imported_company_name: c.imported_company_name.clone().unwrap_or_default(),
                current_associated_parent_id: state
                    .edges
                    .iter()
                    .find(|e| &e.child_id == id)
                    .map(|e| e.parent_id.clone()),
            })
            .collect())
    }

    async fn fetch_parents_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ParentCompany>, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .companies
            .iter()
            .filter(|(_, c)| c.location_key.as_deref() == Some(location_key))
            .map(|(id, c)| ParentCompany {
                id: Some(id.clone()),
                location_key: location_key.to_string(),
                name: c.name.clone(),
                associated_child_ids: state
                    .edges
                    .iter()
                    .filter(|e| &e.parent_id == id)
                    .map(|e| e.child_id.clone())
                    .collect(),
            })
            .collect())
    }

    async fn fetch_company(&self, id: &str) -> Result<CompanySnapshot, ApiError> {
        let state = self.state.lock().unwrap();
        if state.fail_fetch_company.contains(id) {
            return Err(remote("read timed out"));
        }

        let company = state.companies.get(id).ok_or_else(|| ApiError::NotFound {
            resource: format!("company {}", id),
        })?;

        Ok(CompanySnapshot {
            id: id.to_string(),
            location_key: company.location_key.clone(),
            client_parent_company_id: company.client_parent_company_id.clone(),
        })
    }

    async fn create_company(
        &self,
        name: &str,
        location_key: &str,
    ) -> Result<ParentCompany, ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_create.clone() {
            return Err(error);
        }
        state.next_id += 1;
        let id = state.next_id.to_string();

        state.companies.insert(
            id.clone(),
            StoredCompany {
                name: name.to_string(),
                location_key: Some(location_key.to_string()),
                client_parent_company_id: None,
                imported_company_name: None,
            },
        );
        state.writes.push(Write::Create {
            id: id.clone(),
            name: name.to_string(),
            location_key: location_key.to_string(),
        });

        Ok(ParentCompany::new(id, location_key, name))
    }

    async fn update_company_name(&self, id: &str, name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rename.contains(id) {
            return Err(remote("update rejected"));
        }
        let company = state.companies.get_mut(id).ok_or_else(|| ApiError::NotFound {
            resource: format!("company {}", id),
        })?;
        company.name = name.to_string();
        state.writes.push(Write::UpdateName {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list_associated_children(
        &self,
        parent_id: &str,
    ) -> Result<BTreeSet<CompanyId>, ApiError> {
        if self.state.lock().unwrap().fail_link_listing {
            return Err(remote("association listing unavailable"));
        }
        Ok(self.children_of(parent_id))
    }

    async fn add_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add.contains(child_id) {
            return Err(remote("association write rejected"));
        }

        let edge = AssociationEdge::new(parent_id, child_id);
        state.edges.insert(edge.clone());
        state.writes.push(Write::Add(edge));
        Ok(())
    }

    async fn remove_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_remove.contains(child_id) {
            return Err(remote("association archive rejected"));
        }

        let edge = AssociationEdge::new(parent_id, child_id);
        state.edges.remove(&edge);
        state.writes.push(Write::Remove(edge));
        Ok(())
    }
}
