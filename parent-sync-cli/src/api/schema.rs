//! Portal-specific CRM names: company properties and association type ids

use serde::Deserialize;

/// Internal names of the company properties the tool reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertyNames {
    /// Display name of a company
    pub name: String,
    /// Name imported from the source system, set on child companies
    pub imported_name: String,
    /// "Client Company Location ID", set on the parent company
    pub location_id: String,
    /// "Client Parent Company ID", set on child companies
    pub parent_location_id: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            imported_name: "imported_company_name".to_string(),
            location_id: "client_company_location_id".to_string(),
            parent_location_id: "client_parent_company_id".to_string(),
        }
    }
}

impl PropertyNames {
    /// Properties requested on every company read
    pub fn all(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.imported_name.clone(),
            self.location_id.clone(),
            self.parent_location_id.clone(),
        ]
    }
}

/// Company-to-company association labels
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssociationTypes {
    pub category: String,
    /// Type id of the parent → child direction
    pub parent_to_child: u32,
    /// Type id of the child → parent direction
    pub child_to_parent: u32,
}

impl Default for AssociationTypes {
    fn default() -> Self {
        Self {
            category: "HUBSPOT_DEFINED".to_string(),
            parent_to_child: 13,
            child_to_parent: 14,
        }
    }
}

/// Everything the HubSpot client needs to know about the portal layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrmSchema {
    pub properties: PropertyNames,
    pub associations: AssociationTypes,
}
