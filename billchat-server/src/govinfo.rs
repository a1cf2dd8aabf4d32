// Copyright 2025 Billchat Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! GovInfo service adapter.
//!
//! Translates typed tool arguments into REST calls against the GovInfo
//! API and normalizes the heterogeneous JSON responses into stable
//! shapes. Upstream errors are always wrapped with the HTTP status and
//! reason phrase; raw error bodies are never surfaced as-is.

use billchat_core::bill::BillRecord;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::GovInfoConfig;

/// Indexed data does not predate this; earlier explicit start dates
/// are rejected.
pub const MIN_START_DATE: &str = "2014-01-01";

#[derive(Debug, Error)]
pub enum GovInfoError {
    /// The upstream call exceeded the bounded timeout.
    #[error("GovInfo request timed out")]
    Timeout,

    /// Non-2xx from the upstream API, wrapped with status + reason.
    #[error("GovInfo API error: {status} - {reason}")]
    Upstream { status: u16, reason: String },

    /// Caller-supplied arguments failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Transport-level failure reaching the API.
    #[error("GovInfo API unreachable: {0}")]
    Transport(String),

    /// The upstream answered with a payload we could not decode.
    #[error("malformed GovInfo response: {0}")]
    Malformed(String),
}

/// Arguments for the bill search tool. Field names mirror the tool
/// schema the model sees; unknown fields are rejected at the boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchBillsParams {
    /// Text to search for in bills.
    pub query: String,
    /// Start date, YYYY-MM-DD, 2014-01-01 or later.
    #[serde(default)]
    pub date_issued_start_date: Option<String>,
    /// End date, YYYY-MM-DD. Defaults to today.
    #[serde(default)]
    pub date_issued_end_date: Option<String>,
    /// Number of results to return.
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Arguments for the published-packages listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublishedParams {
    /// Start date, YYYY-MM-DD.
    pub start_date: String,
    /// End date, YYYY-MM-DD.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Collection code(s), e.g. "BILLS".
    pub collection: String,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub congress: Option<String>,
    #[serde(default)]
    pub offset_mark: Option<String>,
    #[serde(default)]
    pub modified_since: Option<String>,
}

/// Normalized search result handed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBillsResult {
    pub count: u64,
    pub bills: Vec<BillRecord>,
}

/// Resolve and validate the search date range.
///
/// Start defaults to [`MIN_START_DATE`], end defaults to today; an
/// explicit start before [`MIN_START_DATE`] is a validation error.
pub fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(String, String), GovInfoError> {
    let start = start.unwrap_or(MIN_START_DATE);
    let end_owned;
    let end = match end {
        Some(e) => e,
        None => {
            end_owned = Utc::now().date_naive().format("%Y-%m-%d").to_string();
            end_owned.as_str()
        }
    };

    let parse = |label: &str, value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            GovInfoError::Validation(format!(
                "{} must be a YYYY-MM-DD date, got '{}'",
                label, value
            ))
        })
    };

    let start_date = parse("start date", start)?;
    let end_date = parse("end date", end)?;

    let min = NaiveDate::parse_from_str(MIN_START_DATE, "%Y-%m-%d")
        .map_err(|_| GovInfoError::Validation("invalid minimum date".to_string()))?;

    if start_date < min {
        return Err(GovInfoError::Validation(format!(
            "start date {} predates indexed data; data is available from {} onwards",
            start, MIN_START_DATE
        )));
    }

    if start_date > end_date {
        return Err(GovInfoError::Validation(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }

    Ok((start.to_string(), end.to_string()))
}

/// Build the GovInfo search query string for a bill search.
pub fn build_search_query(query: &str, start: &str, end: &str) -> String {
    format!(
        "collection:BILLS AND ({}) AND dateIssued:range({},{})",
        query, start, end
    )
}

/// Map a raw /search response into the normalized result.
///
/// A missing count or result list yields an empty result; a record
/// with an unparsable packageId degrades to placeholder fields instead
/// of aborting the batch.
pub fn map_search_response(data: &Value) -> SearchBillsResult {
    let count = data.get("count").and_then(Value::as_u64).unwrap_or(0);
    let results = data.get("results").and_then(Value::as_array);

    let (count, results) = match (count, results) {
        (0, _) | (_, None) => return SearchBillsResult { count: 0, bills: vec![] },
        (c, Some(r)) => (c, r),
    };

    let bills = results
        .iter()
        .map(|hit| {
            BillRecord::from_raw(
                hit.get("packageId").and_then(Value::as_str).unwrap_or(""),
                hit.get("title").and_then(Value::as_str),
                hit.get("dateIssued").and_then(Value::as_str),
                hit.get("resultLink").and_then(Value::as_str),
            )
        })
        .collect();

    SearchBillsResult { count, bills }
}

/// HTTP client for the GovInfo API with a bounded per-call timeout.
pub struct GovInfoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GovInfoClient {
    pub fn new(config: &GovInfoConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }

    /// Search bills by text query within a date range.
    pub async fn search_bills(
        &self,
        params: &SearchBillsParams,
    ) -> Result<SearchBillsResult, GovInfoError> {
        let (start, end) = resolve_date_range(
            params.date_issued_start_date.as_deref(),
            params.date_issued_end_date.as_deref(),
        )?;

        let body = json!({
            "query": build_search_query(&params.query, &start, &end),
            "pageSize": params.page_size.unwrap_or(10),
            "offsetMark": "*",
            "sorts": [{ "field": "dateIssued", "sortOrder": "DESC" }],
            "historical": true,
        });

        tracing::debug!(query = %params.query, %start, %end, "searching bills");

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("Accept", "application/json")
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let data = decode(response).await?;
        let result = map_search_response(&data);
        tracing::debug!(count = result.count, returned = result.bills.len(), "search complete");
        Ok(result)
    }

    /// Summary for one package. A 404 degrades to a benign "no summary
    /// available" result rather than an error.
    pub async fn get_package_summary(&self, package_id: &str) -> Result<Value, GovInfoError> {
        let response = self
            .get(&format!("/packages/{}/summary", package_id))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(package_id, "no summary available");
            return Ok(json!({
                "packageId": package_id,
                "summary": "No summary is available for this bill.",
            }));
        }

        decode(response).await
    }

    /// Detailed information about one package.
    pub async fn get_bill_details(&self, package_id: &str) -> Result<Value, GovInfoError> {
        let response = self
            .get(&format!("/packages/{}/details", package_id))
            .await?;
        decode(response).await
    }

    /// Bills related to one package.
    pub async fn get_related_bills(&self, package_id: &str) -> Result<Value, GovInfoError> {
        let response = self
            .get(&format!("/packages/{}/related", package_id))
            .await?;
        decode(response).await
    }

    /// Available collections.
    pub async fn get_collections(&self) -> Result<Value, GovInfoError> {
        let response = self.get("/collections").await?;
        decode(response).await
    }

    /// Packages published within a date range.
    pub async fn get_published_packages(
        &self,
        params: &PublishedParams,
    ) -> Result<Value, GovInfoError> {
        let path = match &params.end_date {
            Some(end) => format!("/published/{}/{}", params.start_date, end),
            None => format!("/published/{}", params.start_date),
        };

        let mut query: Vec<(&str, String)> = vec![
            ("pageSize", params.page_size.unwrap_or(10).to_string()),
            ("collection", params.collection.clone()),
        ];
        if let Some(congress) = &params.congress {
            query.push(("congress", congress.clone()));
        }
        if let Some(offset_mark) = &params.offset_mark {
            query.push(("offsetMark", offset_mark.clone()));
        }
        if let Some(modified_since) = &params.modified_since {
            query.push(("modifiedSince", modified_since.clone()));
        }

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&query)
            .header("Accept", "application/json")
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, GovInfoError> {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)
    }
}

fn map_transport_error(e: reqwest::Error) -> GovInfoError {
    if e.is_timeout() {
        GovInfoError::Timeout
    } else {
        GovInfoError::Transport(e.to_string())
    }
}

/// Check the status and decode the JSON body. Non-2xx becomes an
/// [`GovInfoError::Upstream`] carrying status + reason phrase.
async fn decode(response: reqwest::Response) -> Result<Value, GovInfoError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GovInfoError::Upstream {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| GovInfoError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_defaults() {
        let (start, end) = resolve_date_range(None, None).unwrap();
        assert_eq!(start, MIN_START_DATE);
        assert_eq!(end, Utc::now().date_naive().format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_date_range_rejects_pre_2014_start() {
        let err = resolve_date_range(Some("2013-12-31"), None).unwrap_err();
        assert!(matches!(err, GovInfoError::Validation(_)));
        assert!(err.to_string().contains("2014-01-01"));
    }

    #[test]
    fn test_date_range_accepts_boundary() {
        let (start, _) = resolve_date_range(Some("2014-01-01"), Some("2014-06-30")).unwrap();
        assert_eq!(start, "2014-01-01");
    }

    #[test]
    fn test_date_range_rejects_malformed() {
        assert!(matches!(
            resolve_date_range(Some("last year"), None),
            Err(GovInfoError::Validation(_))
        ));
        assert!(matches!(
            resolve_date_range(None, Some("01/02/2020")),
            Err(GovInfoError::Validation(_))
        ));
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(matches!(
            resolve_date_range(Some("2020-06-01"), Some("2020-01-01")),
            Err(GovInfoError::Validation(_))
        ));
    }

    #[test]
    fn test_build_search_query() {
        let q = build_search_query("climate change", "2014-01-01", "2020-12-31");
        assert_eq!(
            q,
            "collection:BILLS AND (climate change) AND dateIssued:range(2014-01-01,2020-12-31)"
        );
    }

    #[test]
    fn test_map_search_response_normalizes_records() {
        let data = json!({
            "count": 2,
            "results": [
                {
                    "packageId": "BILLS-118hr10150ih",
                    "title": "Clean Energy Act",
                    "dateIssued": "2024-03-01",
                    "resultLink": "https://api.govinfo.gov/packages/BILLS-118hr10150ih/summary"
                },
                {
                    "packageId": "BOGUS",
                    "title": null
                }
            ]
        });

        let result = map_search_response(&data);
        assert_eq!(result.count, 2);
        assert_eq!(result.bills.len(), 2);

        let first = &result.bills[0];
        assert_eq!(first.congress, "118");
        assert_eq!(first.bill_number, "10150");
        assert_eq!(
            first.url,
            "https://www.govinfo.gov/app/details/BILLS-118hr10150ih"
        );

        // The malformed record degrades instead of aborting the batch
        let second = &result.bills[1];
        assert_eq!(second.title, "Untitled");
        assert_eq!(second.congress, "Unknown");
        assert_eq!(second.date_issued, "Date unknown");
    }

    #[test]
    fn test_map_search_response_empty_when_fields_missing() {
        let result = map_search_response(&json!({ "message": "No results" }));
        assert_eq!(result.count, 0);
        assert!(result.bills.is_empty());

        let result = map_search_response(&json!({ "count": 0, "results": [] }));
        assert_eq!(result.count, 0);
    }

    #[test]
    fn test_params_reject_unknown_fields() {
        let err = serde_json::from_value::<SearchBillsParams>(json!({
            "query": "climate",
            "bogusField": true
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_params_camel_case_names() {
        let params: SearchBillsParams = serde_json::from_value(json!({
            "query": "climate",
            "dateIssuedStartDate": "2020-01-01",
            "pageSize": 5
        }))
        .unwrap();
        assert_eq!(params.date_issued_start_date.as_deref(), Some("2020-01-01"));
        assert_eq!(params.page_size, Some(5));
    }
}
