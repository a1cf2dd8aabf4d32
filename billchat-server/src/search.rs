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

//! Optional semantic search over the external document/embedding store.
//!
//! The query is embedded, then matched against stored bill embeddings
//! by the store's `match_bills_by_date` procedure. The store call is an
//! idempotent remote read and is wrapped in the retry policy; the
//! embedding call is not retried (provider errors there are permanent
//! from our point of view).

use async_openai::{
    config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client as OpenAIClient,
};
use async_trait::async_trait;
use billchat_core::bill::BillRecord;
use billchat_core::error::StoreError;
use billchat_core::resilience::{retry_with_policy, RetryPolicy};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::govinfo::resolve_date_range;

/// One ranked match from the document store.
#[derive(Debug, Clone, Deserialize)]
pub struct BillMatch {
    pub package_id: String,
    pub title: String,
    pub date_issued: String,
    pub congress: String,
    #[serde(default)]
    pub doc_class: String,
    pub similarity: f32,
}

/// The stored-procedure collaborator: ranked similarity search over
/// bill embeddings within date bounds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn match_bills(
        &self,
        embedding: &[f32],
        threshold: f32,
        count: u32,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<BillMatch>, StoreError>;
}

/// REST implementation against a PostgREST-style RPC endpoint.
pub struct RestDocumentStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestDocumentStore {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn match_bills(
        &self,
        embedding: &[f32],
        threshold: f32,
        count: u32,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<BillMatch>, StoreError> {
        let body = json!({
            "query_embedding": embedding,
            "match_threshold": threshold,
            "match_count": count,
            "start_date": start_date,
            "end_date": end_date,
        });

        let response = self
            .http
            .post(format!("{}/rest/v1/rpc/match_bills_by_date", self.base_url))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        if !status.is_success() {
            // PostgREST surfaces database errors as {code, message}
            if let (Some(code), Some(message)) = (
                payload.get("code").and_then(Value::as_str),
                payload.get("message").and_then(Value::as_str),
            ) {
                return Err(StoreError::Database {
                    code: code.to_string(),
                    message: message.to_string(),
                });
            }
            return Err(StoreError::Transport(format!("HTTP {}", status)));
        }

        serde_json::from_value(payload).map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

/// Retry wrapper around the store lookup. Transient store failures
/// (statement timeout, serialization failure, deadlock) are retried;
/// everything else propagates immediately.
pub async fn match_bills_with_retry(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    embedding: &[f32],
    threshold: f32,
    count: u32,
    start_date: &str,
    end_date: &str,
) -> Result<Vec<BillMatch>, StoreError> {
    retry_with_policy(policy, || {
        store.match_bills(embedding, threshold, count, start_date, end_date)
    })
    .await
    .map_err(|e| e.into_inner())
}

pub struct SemanticSearch {
    openai: OpenAIClient<OpenAIConfig>,
    embedding_model: String,
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    threshold: f32,
    count: u32,
}

impl SemanticSearch {
    pub fn new(
        openai_api_key: &str,
        config: &SearchConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let openai =
            OpenAIClient::with_config(OpenAIConfig::new().with_api_key(openai_api_key));

        Self {
            openai,
            embedding_model: config.embedding_model.clone(),
            store,
            policy: RetryPolicy::default(),
            threshold: config.match_threshold,
            count: config.match_count,
        }
    }

    /// Search bills by meaning within a date range. Returns a result
    /// value in the same shape as the keyword search.
    pub async fn search(
        &self,
        query: &str,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> anyhow::Result<Value> {
        let (start, end) = resolve_date_range(start_date, end_date)?;

        let embedding = self.embed(query).await?;
        tracing::debug!(query, %start, %end, dims = embedding.len(), "matching bill embeddings");

        let matches = match_bills_with_retry(
            self.store.as_ref(),
            &self.policy,
            &embedding,
            self.threshold,
            self.count,
            &start,
            &end,
        )
        .await?;

        let bills: Vec<Value> = matches
            .iter()
            .map(|m| {
                let record = BillRecord::from_raw(
                    &m.package_id,
                    Some(&m.title),
                    Some(&m.date_issued),
                    None,
                );
                let mut value = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("similarity".to_string(), json!(m.similarity));
                }
                value
            })
            .collect();

        Ok(json!({ "count": bills.len(), "bills": bills }))
    }

    async fn embed(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(query)
            .build()?;

        let response = self.openai.embeddings().create(request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedding response contained no vectors"))?;

        Ok(embedding.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billchat_core::error::CODE_STATEMENT_TIMEOUT;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store that fails with a given error a fixed number of times,
    /// then succeeds.
    struct FlakyStore {
        failures: AtomicU32,
        code: &'static str,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn match_bills(
            &self,
            _embedding: &[f32],
            _threshold: f32,
            _count: u32,
            _start_date: &str,
            _end_date: &str,
        ) -> Result<Vec<BillMatch>, StoreError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Database {
                    code: self.code.to_string(),
                    message: "canceling statement due to statement timeout".to_string(),
                });
            }

            Ok(vec![BillMatch {
                package_id: "BILLS-117hr3684enr".to_string(),
                title: "Infrastructure Investment and Jobs Act".to_string(),
                date_issued: "2021-11-15".to_string(),
                congress: "117".to_string(),
                doc_class: "hr".to_string(),
                similarity: 0.83,
            }])
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retries_statement_timeout_then_succeeds() {
        let store = FlakyStore {
            failures: AtomicU32::new(2),
            code: CODE_STATEMENT_TIMEOUT,
        };

        let matches = match_bills_with_retry(
            &store,
            &instant_policy(),
            &[0.0; 4],
            0.7,
            10,
            "2021-01-01",
            "2021-12-31",
        )
        .await
        .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].congress, "117");
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let store = FlakyStore {
            failures: AtomicU32::new(100),
            code: "42P01", // undefined_table: permanent
        };

        let err = match_bills_with_retry(
            &store,
            &instant_policy(),
            &[0.0; 4],
            0.7,
            10,
            "2021-01-01",
            "2021-12-31",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::Database { ref code, .. } if code == "42P01"));
        // Only the first attempt ran
        assert_eq!(store.failures.load(Ordering::SeqCst), 99);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let store = FlakyStore {
            failures: AtomicU32::new(100),
            code: CODE_STATEMENT_TIMEOUT,
        };

        let err = match_bills_with_retry(
            &store,
            &instant_policy(),
            &[0.0; 4],
            0.7,
            10,
            "2021-01-01",
            "2021-12-31",
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains(CODE_STATEMENT_TIMEOUT));
        // Initial attempt + 3 retries
        assert_eq!(store.failures.load(Ordering::SeqCst), 96);
    }

    #[test]
    fn test_bill_match_deserializes_store_row() {
        let row = json!({
            "package_id": "BILLS-118s1234is",
            "title": "Some Act",
            "date_issued": "2023-05-01",
            "congress": "118",
            "doc_class": "s",
            "similarity": 0.91
        });

        let m: BillMatch = serde_json::from_value(row).unwrap();
        assert_eq!(m.package_id, "BILLS-118s1234is");
        assert!((m.similarity - 0.91).abs() < 1e-6);
    }
}
