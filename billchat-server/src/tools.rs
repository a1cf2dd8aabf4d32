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

//! Tool registry: the callable operations exposed to the model.
//!
//! Arguments are validated at the boundary by deserializing into typed
//! parameter structs (`deny_unknown_fields`). A tool-level failure is
//! converted into an `{ "error": ... }` result and fed back to the
//! model so it can explain the failure conversationally; it never
//! aborts the surrounding request.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::govinfo::{GovInfoClient, PublishedParams, SearchBillsParams};
use crate::llm::ToolSpec;
use crate::search::SemanticSearch;

/// Arguments for the per-package lookups.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PackageIdParams {
    /// The GovInfo package ID for the bill.
    pub package_id: String,
}

/// Arguments for the semantic search tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SemanticSearchParams {
    pub query: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

pub struct ToolRegistry {
    govinfo: Arc<GovInfoClient>,
    semantic: Option<Arc<SemanticSearch>>,
}

impl ToolRegistry {
    pub fn new(govinfo: Arc<GovInfoClient>, semantic: Option<Arc<SemanticSearch>>) -> Self {
        Self { govinfo, semantic }
    }

    /// Declarations handed to the model. The semantic tool only
    /// appears when a document store is configured.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs = vec![
            ToolSpec {
                name: "search_bills".to_string(),
                description: "Search for U.S. government bills and legislation by text query. \
                              Data is available from January 1, 2014 onwards."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Text to search for in bills (required)"
                        },
                        "dateIssuedStartDate": {
                            "type": "string",
                            "description": "Start date in YYYY-MM-DD format. Must be 2014-01-01 or later. Defaults to 2014-01-01."
                        },
                        "dateIssuedEndDate": {
                            "type": "string",
                            "description": "End date in YYYY-MM-DD format. Defaults to today."
                        },
                        "pageSize": {
                            "type": "number",
                            "description": "Number of results to return (default: 10)"
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolSpec {
                name: "get_bill_summary".to_string(),
                description: "Get the summary of a specific bill using its package ID."
                    .to_string(),
                parameters: package_id_schema(),
            },
            ToolSpec {
                name: "get_bill_details".to_string(),
                description: "Get detailed information about a specific bill using its package ID."
                    .to_string(),
                parameters: package_id_schema(),
            },
            ToolSpec {
                name: "get_related_bills".to_string(),
                description: "Get bills related to a specific bill using its package ID."
                    .to_string(),
                parameters: package_id_schema(),
            },
            ToolSpec {
                name: "list_collections".to_string(),
                description: "List the GovInfo document collections that can be searched."
                    .to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_published_packages".to_string(),
                description: "List packages published within a date range for a collection."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "startDate": {
                            "type": "string",
                            "description": "Start date in YYYY-MM-DD format"
                        },
                        "endDate": {
                            "type": "string",
                            "description": "End date in YYYY-MM-DD format"
                        },
                        "collection": {
                            "type": "string",
                            "description": "Collection code, e.g. 'BILLS'"
                        },
                        "pageSize": {
                            "type": "number",
                            "description": "Number of results per page (default: 10)"
                        },
                        "congress": {
                            "type": "string",
                            "description": "Congress number (e.g., '117')"
                        },
                        "offsetMark": {
                            "type": "string",
                            "description": "Pagination offset marker"
                        }
                    },
                    "required": ["startDate", "collection"]
                }),
            },
        ];

        if self.semantic.is_some() {
            specs.push(ToolSpec {
                name: "semantic_search_bills".to_string(),
                description: "Search bills by meaning rather than keywords, using vector \
                              similarity over bill embeddings."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Natural-language description of the bills to find"
                        },
                        "startDate": {
                            "type": "string",
                            "description": "Start date in YYYY-MM-DD format. Defaults to 2014-01-01."
                        },
                        "endDate": {
                            "type": "string",
                            "description": "End date in YYYY-MM-DD format. Defaults to today."
                        }
                    },
                    "required": ["query"]
                }),
            });
        }

        specs
    }

    /// Resolve one tool call. Always produces a result value; errors
    /// become `{ "error": ... }` per the propagation policy.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Value {
        match self.execute(name, arguments).await {
            Ok(value) => value,
            Err(message) => {
                tracing::warn!(tool = name, error = %message, "tool call failed");
                json!({ "error": message })
            }
        }
    }

    async fn execute(&self, name: &str, arguments: &str) -> Result<Value, String> {
        match name {
            "search_bills" => {
                let params: SearchBillsParams = parse_args(arguments)?;
                let result = self
                    .govinfo
                    .search_bills(&params)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(result).map_err(|e| e.to_string())
            }
            "get_bill_summary" => {
                let params: PackageIdParams = parse_args(arguments)?;
                self.govinfo
                    .get_package_summary(&params.package_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            "get_bill_details" => {
                let params: PackageIdParams = parse_args(arguments)?;
                self.govinfo
                    .get_bill_details(&params.package_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            "get_related_bills" => {
                let params: PackageIdParams = parse_args(arguments)?;
                self.govinfo
                    .get_related_bills(&params.package_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            "list_collections" => self
                .govinfo
                .get_collections()
                .await
                .map_err(|e| e.to_string()),
            "get_published_packages" => {
                let params: PublishedParams = parse_args(arguments)?;
                self.govinfo
                    .get_published_packages(&params)
                    .await
                    .map_err(|e| e.to_string())
            }
            "semantic_search_bills" => {
                let semantic = self
                    .semantic
                    .as_ref()
                    .ok_or_else(|| "semantic search is not configured".to_string())?;
                let params: SemanticSearchParams = parse_args(arguments)?;
                semantic
                    .search(
                        &params.query,
                        params.start_date.as_deref(),
                        params.end_date.as_deref(),
                    )
                    .await
                    .map_err(|e| e.to_string())
            }
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

fn package_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "packageId": {
                "type": "string",
                "description": "The GovInfo package ID for the bill"
            }
        },
        "required": ["packageId"]
    })
}

fn parse_args<T: DeserializeOwned>(arguments: &str) -> Result<T, String> {
    let raw = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(raw).map_err(|e| format!("invalid tool arguments: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovInfoConfig;

    fn registry() -> ToolRegistry {
        let config = GovInfoConfig {
            api_key: Some("test-key".to_string()),
            // Nothing listens here; network-touching tools fail fast
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
        };
        ToolRegistry::new(Arc::new(GovInfoClient::new(&config).unwrap()), None)
    }

    #[test]
    fn test_specs_without_semantic_store() {
        let specs = registry().specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "search_bills",
                "get_bill_summary",
                "get_bill_details",
                "get_related_bills",
                "list_collections",
                "get_published_packages",
            ]
        );
        assert!(specs.iter().all(|s| s.parameters.get("type").is_some()));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let result = registry().dispatch("launch_rocket", "{}").await;
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("Unknown tool: launch_rocket"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_error_result() {
        let result = registry().dispatch("search_bills", "not json").await;
        assert!(result["error"].as_str().unwrap().contains("invalid tool arguments"));

        let result = registry()
            .dispatch("search_bills", r#"{"query":"x","bogus":1}"#)
            .await;
        assert!(result["error"].as_str().unwrap().contains("invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_pre_2014_date_becomes_error_result() {
        let result = registry()
            .dispatch(
                "search_bills",
                r#"{"query":"climate","dateIssuedStartDate":"2013-12-31"}"#,
            )
            .await;
        assert!(result["error"].as_str().unwrap().contains("2014-01-01"));
    }

    #[tokio::test]
    async fn test_semantic_tool_unconfigured() {
        let result = registry()
            .dispatch("semantic_search_bills", r#"{"query":"health"}"#)
            .await;
        assert!(result["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_becomes_error_result() {
        let result = registry()
            .dispatch("get_bill_details", r#"{"packageId":"BILLS-118hr1ih"}"#)
            .await;
        assert!(result.get("error").is_some());
    }
}
