//! HubSpot wire shapes
//!
//! Request and response bodies for the v3 objects API and the v4 associations
//! API. Only the fields the tool uses are modelled; everything else is ignored.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A company record as returned by search, read and create
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
}

impl CompanyRecord {
    /// Trimmed, non-empty property value
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|value| value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextPage {
    pub after: String,
}

/// Cursor of the next page, if any
fn next_cursor(paging: &Option<Paging>) -> Option<String> {
    paging
        .as_ref()
        .and_then(|p| p.next.as_ref())
        .map(|n| n.after.clone())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<CompanyRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl SearchResponse {
    pub fn next_cursor(&self) -> Option<String> {
        next_cursor(&self.paging)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub properties: Vec<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SearchRequest {
    /// Search for companies whose `property` equals `value`
    pub fn property_equals(property: &str, value: &str, properties: Vec<String>, limit: u32) -> Self {
        Self {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter {
                    property_name: property.to_string(),
                    operator: "EQ".to_string(),
                    value: value.to_string(),
                }],
            }],
            properties,
            limit,
            after: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: String,
    pub value: String,
}

/// Body of a company create or update
#[derive(Debug, Clone, Serialize)]
pub struct CompanyWrite {
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationType {
    #[serde(default)]
    pub category: Option<String>,
    pub type_id: u32,
    #[serde(default)]
    pub label: Option<String>,
}

/// One associated record in a v4 association listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedObject {
    #[serde(deserialize_with = "id_string")]
    pub to_object_id: String,
    #[serde(default)]
    pub association_types: Vec<AssociationType>,
}

impl AssociatedObject {
    pub fn has_type(&self, type_id: u32) -> bool {
        self.association_types.iter().any(|t| t.type_id == type_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationListResponse {
    #[serde(default)]
    pub results: Vec<AssociatedObject>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl AssociationListResponse {
    pub fn next_cursor(&self) -> Option<String> {
        next_cursor(&self.paging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

impl ObjectRef {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReadRequest {
    pub inputs: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReadResult {
    pub from: ObjectRef,
    #[serde(default)]
    pub to: Vec<AssociatedObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReadResponse {
    #[serde(default)]
    pub results: Vec<BatchReadResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: String,
    pub association_type_id: u32,
}

/// One labelled link in a batch create or archive request
#[derive(Debug, Clone, Serialize)]
pub struct AssociationInput {
    pub from: ObjectRef,
    pub to: ObjectRef,
    pub types: Vec<AssociationSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssociationBatchRequest {
    pub inputs: Vec<AssociationInput>,
}

/// Per-input error reported inside a 207 Multi-Status batch response
#[derive(Debug, Clone, Deserialize)]
pub struct BatchError {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchWriteResponse {
    #[serde(default)]
    pub errors: Vec<BatchError>,
}

/// HubSpot returns object ids as strings in v3 and as numbers in parts of v4
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected object id as string or number, got {}",
            other
        ))),
    }
}
