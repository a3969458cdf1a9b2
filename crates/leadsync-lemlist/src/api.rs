//! Lemlist REST API binding
//!
//! Every call goes through the shared [`RetryingExecutor`], so all endpoints
//! draw from the same 20 requests / 2 s budget.

use std::time::Duration;

use leadsync_core::{
    ApiRequest, ApiResponse, FailureKind, Outcome, PaginationAggregator, RateWindow,
    RetryingExecutor, Transport, WorkItem,
};
use serde_json::{Map, Value};

pub const BASE_URL: &str = "https://api.lemlist.com/api";

/// Published limit: 20 requests per 2 seconds per API key
pub const RATE_LIMIT_REQUESTS: usize = 20;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(2);

/// Campaigns per listing page (API maximum)
pub const CAMPAIGNS_PAGE_LIMIT: u32 = 100;

/// Lead exports of large campaigns are slow to render server-side
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// Variable erased by default
pub const DEFAULT_ERASE_VARIABLE: &str = "phone";

pub fn default_rate_window() -> RateWindow {
    RateWindow::new(RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW)
}

// === Requests ===

pub fn campaigns_page(page: u32) -> ApiRequest {
    ApiRequest::get(["campaigns"])
        .query("version", "v2")
        .query("limit", CAMPAIGNS_PAGE_LIMIT)
        .query("page", page)
}

pub fn export_leads(campaign_id: &str) -> ApiRequest {
    ApiRequest::get(["campaigns", campaign_id, "export", "leads"])
        .query("state", "all")
        .query("format", "json")
        .timeout(EXPORT_TIMEOUT)
}

pub fn lead_by_email(email: &str) -> ApiRequest {
    ApiRequest::get(["leads", email]).query("version", "v2")
}

pub fn erase_variable(lead_id: &str, variable: &str) -> ApiRequest {
    ApiRequest::delete(["leads", lead_id, "variables"]).query(variable, "")
}

// === Entities ===

/// A campaign as needed for export
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
}

impl Campaign {
    /// `None` when the listing entry has no usable `_id`; name defaults to the id
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = id_string(value.get("_id")?)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        Some(Self { id, name })
    }
}

impl WorkItem for Campaign {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Lookup result for one email
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupResult {
    Found(Vec<String>),
    /// 404: no lead carries this email
    NotFound,
}

/// String form of an identifier; numbers keep their JSON spelling
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Export body is an array of leads, or a single lead object
fn decode_export(resp: &ApiResponse) -> Result<Vec<Map<String, Value>>, String> {
    let value: Value = resp.json().map_err(|e| format!("non-JSON export: {e}"))?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    let total = items.len();
    let leads: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if leads.len() < total {
        log::warn!("dropped {} non-object export entries", total - leads.len());
    }
    Ok(leads)
}

/// `_id`s of a lookup body: an array of leads or one lead object
fn decode_lead_ids(resp: &ApiResponse) -> Result<Vec<String>, String> {
    let value: Value = resp.json().map_err(|e| format!("non-JSON lookup: {e}"))?;
    let ids = match &value {
        Value::Array(items) => items
            .iter()
            .filter_map(|lead| lead.get("_id").and_then(id_string))
            .collect(),
        Value::Object(_) => value.get("_id").and_then(id_string).into_iter().collect(),
        _ => Vec::new(),
    };
    Ok(ids)
}

// === Client ===

pub struct LemlistApi<T> {
    executor: RetryingExecutor<T>,
}

impl<T: Transport> LemlistApi<T> {
    pub fn new(executor: RetryingExecutor<T>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &RetryingExecutor<T> {
        &self.executor
    }

    /// Walk all campaign pages. Entries without an `_id` are skipped.
    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let raw = PaginationAggregator::new(&self.executor, "campaigns").fetch_all(campaigns_page);
        let campaigns: Vec<Campaign> = raw.iter().filter_map(Campaign::from_value).collect();
        if campaigns.len() < raw.len() {
            log::warn!("{} campaigns without _id skipped", raw.len() - campaigns.len());
        }
        campaigns
    }

    /// Export one campaign's leads, each tagged with `_campaignId` and `_campaignName`
    pub fn export_campaign(&self, campaign: &Campaign) -> Outcome<Vec<Map<String, Value>>> {
        self.executor
            .execute_item(&campaign.name, &export_leads(&campaign.id), |resp| {
                let mut leads = decode_export(resp)?;
                for lead in &mut leads {
                    lead.insert("_campaignId".into(), Value::String(campaign.id.clone()));
                    lead.insert("_campaignName".into(), Value::String(campaign.name.clone()));
                }
                Ok(leads)
            })
    }

    /// Look up leads by email; 404 is a successful "not found"
    pub fn lookup_email(&self, email: &str) -> Outcome<LookupResult> {
        match self.executor.execute(&lead_by_email(email)) {
            Ok(resp) => match decode_lead_ids(&resp) {
                Ok(ids) => Outcome::success(email, Some(resp.status), LookupResult::Found(ids)),
                Err(msg) => Outcome::failure(email, Some(resp.status), FailureKind::Decode, msg),
            },
            Err(e) if e.is_status(404) => {
                Outcome::success(email, Some(404), LookupResult::NotFound)
            }
            Err(e) => Outcome::from_request_error(email, &e),
        }
    }

    /// Clear `variable` on one lead; any 2xx counts as done
    pub fn erase_variable(&self, lead_id: &str, variable: &str) -> Outcome<()> {
        match self.executor.execute(&erase_variable(lead_id, variable)) {
            Ok(resp) => Outcome::success(lead_id, Some(resp.status), ()),
            Err(e) => Outcome::from_request_error(lead_id, &e),
        }
    }
}
