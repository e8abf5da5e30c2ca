//! Find, create or rename the parent record of a location key

use log::{debug, info};

use super::error::{DataIntegrityError, ReconcileError};
use super::facade::CrmFacade;
use super::models::{ParentAction, ParentCompany, RunMode};
use crate::api::ApiError;

/// Parent record after resolution, and what was done to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentResolution {
    pub parent: ParentCompany,
    pub action: ParentAction,
}

pub struct ParentResolver<'a, C: CrmFacade + ?Sized> {
    crm: &'a C,
    mode: RunMode,
}

impl<'a, C: CrmFacade + ?Sized> ParentResolver<'a, C> {
    pub fn new(crm: &'a C, mode: RunMode) -> Self {
        Self { crm, mode }
    }

    /// Make sure exactly one parent named `resolved_name` exists for `location_key`.
    ///
    /// Writes only when something differs: a matching parent costs one lookup.
    pub async fn resolve(
        &self,
        location_key: &str,
        resolved_name: &str,
    ) -> Result<ParentResolution, ReconcileError> {
        let mut matches = self.crm.fetch_parents_by_location_key(location_key).await?;

        if matches.len() > 1 {
            let mut parent_ids: Vec<String> =
                matches.iter().filter_map(|p| p.id.clone()).collect();
            parent_ids.sort();
            return Err(DataIntegrityError::DuplicateParent {
                location_key: location_key.to_string(),
                parent_ids,
            }
            .into());
        }

        match matches.pop() {
            None => self.create(location_key, resolved_name).await,
            Some(existing) => self.rename_if_needed(existing, location_key, resolved_name).await,
        }
    }

    async fn create(
        &self,
        location_key: &str,
        resolved_name: &str,
    ) -> Result<ParentResolution, ReconcileError> {
        if self.mode.is_dry_run() {
            info!(
                "Dry run: would create parent '{}' for location key '{}'",
                resolved_name, location_key
            );
            return Ok(ParentResolution {
                parent: ParentCompany::planned(location_key, resolved_name),
                action: ParentAction::WouldCreate,
            });
        }

        let mut parent = match self.crm.create_company(resolved_name, location_key).await {
            Ok(parent) => parent,
            Err(ApiError::DuplicateMatch {
                location_key,
                parent_ids,
            }) => {
                return Err(DataIntegrityError::DuplicateParent {
                    location_key,
                    parent_ids,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };
        parent.location_key = location_key.to_string();
        info!(
            "Created parent {} '{}' for location key '{}'",
            parent.id_or_placeholder(),
            parent.name,
            location_key
        );

        Ok(ParentResolution {
            parent,
            action: ParentAction::Created,
        })
    }

    async fn rename_if_needed(
        &self,
        mut existing: ParentCompany,
        location_key: &str,
        resolved_name: &str,
    ) -> Result<ParentResolution, ReconcileError> {
        existing.location_key = location_key.to_string();

        if existing.name == resolved_name {
            debug!(
                "Parent {} already named '{}'",
                existing.id_or_placeholder(),
                resolved_name
            );
            return Ok(ParentResolution {
                parent: existing,
                action: ParentAction::Unchanged,
            });
        }

        let previous_name = std::mem::replace(&mut existing.name, resolved_name.to_string());

        if self.mode.is_dry_run() {
            info!(
                "Dry run: would rename parent {} from '{}' to '{}'",
                existing.id_or_placeholder(),
                previous_name,
                resolved_name
            );
            return Ok(ParentResolution {
                parent: existing,
                action: ParentAction::WouldRename { previous_name },
            });
        }

        let id = existing.id.clone().unwrap_or_default();
        self.crm.update_company_name(&id, resolved_name).await?;
        info!(
            "Renamed parent {} from '{}' to '{}'",
            id, previous_name, resolved_name
        );

        Ok(ParentResolution {
            parent: existing,
            action: ParentAction::Renamed { previous_name },
        })
    }
}
