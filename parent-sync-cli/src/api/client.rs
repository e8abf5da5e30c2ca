//! HubSpot CRM client
//!
//! Talks to the v3 objects API for company records and the v4 associations
//! API for company-to-company links. Every request goes through the rate
//! limiter; idempotent requests are retried by the retry policy. Company
//! creation goes through [`create_guarded`] because a lost response may still
//! have created the record.

use async_trait::async_trait;
use log::debug;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use super::create::{CreateCalls, create_guarded};
use super::error::ApiError;
use super::models::{
    AssociationBatchRequest, AssociationInput, AssociationListResponse, AssociationSpec,
    BatchReadRequest, BatchReadResponse, BatchWriteResponse, CompanyRecord, CompanyWrite,
    ObjectRef, SearchRequest, SearchResponse,
};
use super::resilience::{
    MonitoringConfig, RateLimiter, RateLimiterStats, ResilienceConfig, RetryPolicy,
};
use super::schema::CrmSchema;
use crate::services::reconcile::{
    ChildCompany, CompanyId, CompanySnapshot, CrmFacade, ParentCompany,
};

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

const SEARCH_PAGE_SIZE: u32 = 100;
const ASSOCIATION_PAGE_SIZE: u32 = 500;
const BATCH_READ_CHUNK: usize = 100;

const COMPANIES_PATH: &str = "/crm/v3/objects/companies";
const COMPANY_LINKS_PATH: &str = "/crm/v4/associations/companies/companies";

pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    schema: CrmSchema,
    retry: RetryPolicy,
    rate_limiter: RateLimiter,
    monitoring: MonitoringConfig,
}

impl HubSpotClient {
    pub fn new(
        base_url: &str,
        access_token: &str,
        timeout: Duration,
        schema: CrmSchema,
        resilience: ResilienceConfig,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::from_transport("HTTP client setup", &e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            schema,
            retry: RetryPolicy::new(resilience.retry),
            rate_limiter: RateLimiter::new(resilience.rate_limit),
            monitoring: resilience.monitoring,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn rate_limit_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats().await
    }

    /// One HTTP exchange without retries. Returns the response body of a 2xx.
    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        resource: &str,
    ) -> Result<String, ApiError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_transport(resource, &e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(resource, &e))?;

        if self.monitoring.request_logging {
            debug!("{} {} -> {}", method, path, status);
        }
        if self.monitoring.log_bodies {
            debug!("Response body: {}", text);
        }

        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, resource, &text, retry_after));
        }
        Ok(text)
    }

    /// Retried request whose response body is discarded
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        resource: &str,
    ) -> Result<String, ApiError> {
        self.retry
            .execute(resource, || {
                self.execute_once(method.clone(), path, query, body, resource)
            })
            .await
    }

    /// Retried request decoded into `T`
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        resource: &str,
    ) -> Result<T, ApiError> {
        let text = self.send(method, path, query, body, resource).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::decode(resource, e))
    }

    /// Every company whose `property` equals `value`, across all pages
    async fn search_companies(
        &self,
        property: &str,
        value: &str,
    ) -> Result<Vec<CompanyRecord>, ApiError> {
        let mut request = SearchRequest::property_equals(
            property,
            value,
            self.schema.properties.all(),
            SEARCH_PAGE_SIZE,
        );
        let resource = format!("company search on {}", property);
        let path = format!("{}/search", COMPANIES_PATH);
        let mut records = Vec::new();

        loop {
            let body = to_body(&request, &resource)?;
            let page: SearchResponse = self
                .request_json(Method::POST, &path, &[], Some(&body), &resource)
                .await?;
            let cursor = page.next_cursor();
            records.extend(page.results);

            match cursor {
                Some(after) => request.after = Some(after),
                None => break,
            }
        }

        debug!(
            "Search {} = '{}' returned {} companies",
            property,
            value,
            records.len()
        );
        Ok(records)
    }

    /// Current parent of each company in `child_ids`, where it has one
    async fn current_parents(
        &self,
        child_ids: &[CompanyId],
    ) -> Result<HashMap<CompanyId, CompanyId>, ApiError> {
        let path = format!("{}/batch/read", COMPANY_LINKS_PATH);
        let child_to_parent = self.schema.associations.child_to_parent;
        let mut parents = HashMap::new();

        for chunk in child_ids.chunks(BATCH_READ_CHUNK) {
            let request = BatchReadRequest {
                inputs: chunk.iter().map(|id| ObjectRef::new(id)).collect(),
            };
            let body = to_body(&request, "association batch read")?;
            let response: BatchReadResponse = self
                .request_json(Method::POST, &path, &[], Some(&body), "association batch read")
                .await?;

            for result in response.results {
                if let Some(parent) = result.to.iter().find(|t| t.has_type(child_to_parent)) {
                    parents.insert(result.from.id.clone(), parent.to_object_id.clone());
                }
            }
        }

        Ok(parents)
    }

    async fn write_link(&self, action: &str, parent_id: &str, child_id: &str) -> Result<(), ApiError> {
        let resource = format!("association {} {} -> {}", action, parent_id, child_id);
        let request = association_request(&self.schema, parent_id, child_id);
        let body = to_body(&request, &resource)?;
        let path = format!("{}/{}", COMPANY_LINKS_PATH, action);

        let text = self.send(Method::POST, &path, &[], Some(&body), &resource).await?;
        let response: BatchWriteResponse = if text.trim().is_empty() {
            BatchWriteResponse::default()
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::decode(&resource, e))?
        };
        batch_result(&resource, &response)
    }
}

#[async_trait]
impl CreateCalls for HubSpotClient {
    async fn create_once(&self, name: &str, location_key: &str) -> Result<ParentCompany, ApiError> {
        let properties = &self.schema.properties;
        let write = CompanyWrite {
            properties: HashMap::from([
                (properties.name.clone(), name.to_string()),
                (properties.location_id.clone(), location_key.to_string()),
            ]),
        };
        let body = to_body(&write, "company create")?;

        let text = self
            .execute_once(Method::POST, COMPANIES_PATH, &[], Some(&body), "company create")
            .await?;
        let record: CompanyRecord =
            serde_json::from_str(&text).map_err(|e| ApiError::decode("company create", e))?;
        Ok(ParentCompany::new(record.id, location_key, name))
    }

    async fn parents_with_key(&self, location_key: &str) -> Result<Vec<ParentCompany>, ApiError> {
        self.fetch_parents_by_location_key(location_key).await
    }
}

#[async_trait]
impl CrmFacade for HubSpotClient {
    async fn fetch_children_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ChildCompany>, ApiError> {
        let records = self
            .search_companies(&self.schema.properties.parent_location_id, location_key)
            .await?;
        let mut children: Vec<ChildCompany> = records
            .iter()
            .map(|record| child_from_record(&self.schema, record))
            .collect();

        let ids: Vec<CompanyId> = children.iter().map(|c| c.id.clone()).collect();
        let parents = self.current_parents(&ids).await?;
        for child in &mut children {
            child.current_associated_parent_id = parents.get(&child.id).cloned();
        }

        Ok(children)
    }

    /// Links are left empty; the association stage reads them itself
    async fn fetch_parents_by_location_key(
        &self,
        location_key: &str,
    ) -> Result<Vec<ParentCompany>, ApiError> {
        let records = self
            .search_companies(&self.schema.properties.location_id, location_key)
            .await?;
        Ok(records
            .iter()
            .map(|record| parent_from_record(&self.schema, record, location_key))
            .collect())
    }

    async fn fetch_company(&self, id: &str) -> Result<CompanySnapshot, ApiError> {
        let resource = format!("company {}", id);
        let path = format!("{}/{}", COMPANIES_PATH, id);
        let query = [("properties", self.schema.properties.all().join(","))];

        let record: CompanyRecord = self
            .request_json(Method::GET, &path, &query, None, &resource)
            .await?;
        Ok(snapshot_from_record(&self.schema, &record))
    }

    async fn create_company(&self, name: &str, location_key: &str) -> Result<ParentCompany, ApiError> {
        create_guarded(self, &self.retry, name, location_key).await
    }

    async fn update_company_name(&self, id: &str, name: &str) -> Result<(), ApiError> {
        let resource = format!("company {} update", id);
        let path = format!("{}/{}", COMPANIES_PATH, id);
        let write = CompanyWrite {
            properties: HashMap::from([(self.schema.properties.name.clone(), name.to_string())]),
        };
        let body = to_body(&write, &resource)?;

        self.send(Method::PATCH, &path, &[], Some(&body), &resource)
            .await
            .map(|_| ())
    }

    async fn list_associated_children(
        &self,
        parent_id: &str,
    ) -> Result<BTreeSet<CompanyId>, ApiError> {
        let resource = format!("associations of company {}", parent_id);
        let path = format!("/crm/v4/objects/companies/{}/associations/companies", parent_id);
        let parent_to_child = self.schema.associations.parent_to_child;
        let mut children = BTreeSet::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![("limit", ASSOCIATION_PAGE_SIZE.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: AssociationListResponse = self
                .request_json(Method::GET, &path, &query, None, &resource)
                .await?;
            children.extend(
                page.results
                    .iter()
                    .filter(|link| link.has_type(parent_to_child))
                    .map(|link| link.to_object_id.clone()),
            );

            match page.next_cursor() {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(children)
    }

    async fn add_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError> {
        self.write_link("batch/create", parent_id, child_id).await
    }

    async fn remove_association(&self, parent_id: &str, child_id: &str) -> Result<(), ApiError> {
        self.write_link("batch/labels/archive", parent_id, child_id).await
    }
}

fn to_body<T: Serialize>(value: &T, resource: &str) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::decode(resource, e))
}

/// `Retry-After` in delta-seconds; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn child_from_record(schema: &CrmSchema, record: &CompanyRecord) -> ChildCompany {
    let properties = &schema.properties;
    ChildCompany::new(
        record.id.clone(),
        record.property(&properties.parent_location_id).unwrap_or_default(),
        record.property(&properties.imported_name).unwrap_or_default(),
    )
}

fn parent_from_record(schema: &CrmSchema, record: &CompanyRecord, location_key: &str) -> ParentCompany {
    let properties = &schema.properties;
    ParentCompany::new(
        record.id.clone(),
        record.property(&properties.location_id).unwrap_or(location_key),
        record.property(&properties.name).unwrap_or_default(),
    )
}

fn snapshot_from_record(schema: &CrmSchema, record: &CompanyRecord) -> CompanySnapshot {
    let properties = &schema.properties;
    CompanySnapshot {
        id: record.id.clone(),
        location_key: record.property(&properties.location_id).map(str::to_string),
        client_parent_company_id: record
            .property(&properties.parent_location_id)
            .map(str::to_string),
    }
}

/// Both directions of one parent/child link, labelled
fn association_request(schema: &CrmSchema, parent_id: &str, child_id: &str) -> AssociationBatchRequest {
    let labels = &schema.associations;
    let spec = |type_id| {
        vec![AssociationSpec {
            association_category: labels.category.clone(),
            association_type_id: type_id,
        }]
    };

    AssociationBatchRequest {
        inputs: vec![
            AssociationInput {
                from: ObjectRef::new(parent_id),
                to: ObjectRef::new(child_id),
                types: spec(labels.parent_to_child),
            },
            AssociationInput {
                from: ObjectRef::new(child_id),
                to: ObjectRef::new(parent_id),
                types: spec(labels.child_to_parent),
            },
        ],
    }
}

/// A 207 Multi-Status with per-input errors is a failed write
fn batch_result(resource: &str, response: &BatchWriteResponse) -> Result<(), ApiError> {
    if response.errors.is_empty() {
        return Ok(());
    }

    let message = response
        .errors
        .iter()
        .map(|e| match &e.category {
            Some(category) => format!("{}: {}", category, e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(ApiError::Remote {
        status: Some(207),
        message: format!("{} partially failed: {}", resource, message),
        retry_after_secs: None,
    })
}
