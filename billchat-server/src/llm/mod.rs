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

//! LLM provider seam and the chat engine.
//!
//! The engine drives a bounded tool-call loop: each round streams one
//! model turn into a bounded channel (the response writer drains it to
//! the transport, giving natural backpressure), and any tool calls the
//! model emitted are resolved sequentially, in emission order, before
//! the next round. A dropped receiver means the client went away and
//! stops the producer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::tools::ToolRegistry;

mod openai;
pub mod prompt;

pub use openai::OpenAiProvider;

/// One inbound conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as emitted by the model.
    pub arguments: String,
}

/// Provider-agnostic tool declaration (name + JSON Schema).
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One entry of the running model context, including the internal
/// tool-call bookkeeping the inbound API never sees.
#[derive(Debug, Clone)]
pub enum TurnMessage {
    System(String),
    User(String),
    Assistant(String),
    AssistantToolCalls(Vec<ToolCallRequest>),
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream one model turn. Content deltas are forwarded to `tx` as
    /// they are produced; tool calls the model requested during the
    /// turn are returned once the stream ends. A closed `tx` is
    /// cancellation, not an error.
    async fn stream_turn(
        &self,
        messages: &[TurnMessage],
        tools: &[ToolSpec],
        tx: &mpsc::Sender<String>,
    ) -> anyhow::Result<Vec<ToolCallRequest>>;

    fn name(&self) -> &str;
}

/// Orchestrates model rounds and tool resolution for one request.
pub struct ChatEngine {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    max_tool_rounds: usize,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            max_tool_rounds,
        }
    }

    /// Start generating an answer for `history`. Returns the consumer
    /// end of the token channel; the producer task ends when the final
    /// round completes, an error occurs, or the receiver is dropped.
    /// Setup failures surface here, before any token is streamed.
    pub fn stream_chat(&self, history: Vec<ChatMessage>) -> anyhow::Result<mpsc::Receiver<String>> {
        if history.is_empty() {
            anyhow::bail!("cannot generate from an empty conversation");
        }

        let (tx, rx) = mpsc::channel(64);
        let provider = self.provider.clone();
        let registry = self.tools.clone();
        let max_rounds = self.max_tool_rounds.max(1);

        tokio::spawn(async move {
            let mut messages: Vec<TurnMessage> =
                vec![TurnMessage::System(prompt::SYSTEM_PROMPT.to_string())];
            for message in history {
                match message.role.as_str() {
                    "system" => messages.push(TurnMessage::System(message.content)),
                    "user" => messages.push(TurnMessage::User(message.content)),
                    "assistant" => messages.push(TurnMessage::Assistant(message.content)),
                    other => {
                        tracing::warn!(role = other, "dropping message with unsupported role");
                    }
                }
            }

            let specs = registry.specs();

            for round in 0..max_rounds {
                // The last round is sent without tools to force a
                // final answer.
                let tools_for_round: &[ToolSpec] = if round + 1 < max_rounds {
                    &specs
                } else {
                    &[]
                };

                let calls = match provider.stream_turn(&messages, tools_for_round, &tx).await {
                    Ok(calls) => calls,
                    Err(e) => {
                        tracing::error!(error = ?e, round, "model turn failed");
                        let _ = tx
                            .send("An error occurred while processing your request.".to_string())
                            .await;
                        return;
                    }
                };

                if calls.is_empty() {
                    return;
                }

                if tx.is_closed() {
                    tracing::debug!("client disconnected, aborting tool resolution");
                    return;
                }

                messages.push(TurnMessage::AssistantToolCalls(calls.clone()));

                // Sequential, in emission order: each result is in the
                // context before the model continues.
                for call in calls {
                    tracing::info!(tool = %call.name, "resolving tool call");
                    let result = registry.dispatch(&call.name, &call.arguments).await;
                    messages.push(TurnMessage::ToolResult {
                        tool_call_id: call.id,
                        content: result.to_string(),
                    });
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovInfoConfig;
    use crate::govinfo::GovInfoClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_registry() -> Arc<ToolRegistry> {
        let config = GovInfoConfig {
            api_key: Some("test-key".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
        };
        Arc::new(ToolRegistry::new(
            Arc::new(GovInfoClient::new(&config).unwrap()),
            None,
        ))
    }

    /// Provider that answers with canned tokens, optionally after one
    /// round of tool calls.
    struct ScriptedProvider {
        rounds: AtomicUsize,
        call_tool_first: bool,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn stream_turn(
            &self,
            messages: &[TurnMessage],
            tools: &[ToolSpec],
            tx: &mpsc::Sender<String>,
        ) -> anyhow::Result<Vec<ToolCallRequest>> {
            let round = self.rounds.fetch_add(1, Ordering::SeqCst);

            if self.call_tool_first && round == 0 {
                assert!(!tools.is_empty());
                return Ok(vec![ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "nonexistent_tool".to_string(),
                    arguments: "{}".to_string(),
                }]);
            }

            // After a tool round the context must carry the call and
            // its result.
            if self.call_tool_first {
                assert!(messages
                    .iter()
                    .any(|m| matches!(m, TurnMessage::AssistantToolCalls(_))));
                assert!(messages
                    .iter()
                    .any(|m| matches!(m, TurnMessage::ToolResult { .. })));
            }

            let _ = tx.send("Hello".to_string()).await;
            let _ = tx.send(" world".to_string()).await;
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> String {
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            out.push_str(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_streams_tokens_without_tools() {
        let provider = Arc::new(ScriptedProvider {
            rounds: AtomicUsize::new(0),
            call_tool_first: false,
        });
        let engine = ChatEngine::new(provider, test_registry(), 10);

        let rx = engine
            .stream_chat(vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }])
            .unwrap();

        assert_eq!(collect(rx).await, "Hello world");
    }

    #[tokio::test]
    async fn test_tool_round_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider {
            rounds: AtomicUsize::new(0),
            call_tool_first: true,
        });
        let engine = ChatEngine::new(provider.clone(), test_registry(), 10);

        let rx = engine
            .stream_chat(vec![ChatMessage {
                role: "user".to_string(),
                content: "search something".to_string(),
            }])
            .unwrap();

        assert_eq!(collect(rx).await, "Hello world");
        // One tool round plus the answering round
        assert_eq!(provider.rounds.load(Ordering::SeqCst), 2);
    }

    /// Provider that always wants another tool round; the budget must
    /// force a final, tool-less turn.
    struct GreedyProvider;

    #[async_trait]
    impl LlmProvider for GreedyProvider {
        async fn stream_turn(
            &self,
            _messages: &[TurnMessage],
            tools: &[ToolSpec],
            tx: &mpsc::Sender<String>,
        ) -> anyhow::Result<Vec<ToolCallRequest>> {
            if tools.is_empty() {
                let _ = tx.send("forced answer".to_string()).await;
                return Ok(vec![]);
            }
            Ok(vec![ToolCallRequest {
                id: "c".to_string(),
                name: "nonexistent_tool".to_string(),
                arguments: "{}".to_string(),
            }])
        }

        fn name(&self) -> &str {
            "greedy"
        }
    }

    #[tokio::test]
    async fn test_empty_history_is_a_setup_error() {
        let engine = ChatEngine::new(Arc::new(GreedyProvider), test_registry(), 3);
        assert!(engine.stream_chat(vec![]).is_err());
    }

    #[tokio::test]
    async fn test_round_budget_forces_final_answer() {
        let engine = ChatEngine::new(Arc::new(GreedyProvider), test_registry(), 3);

        let rx = engine
            .stream_chat(vec![ChatMessage {
                role: "user".to_string(),
                content: "loop forever".to_string(),
            }])
            .unwrap();

        assert_eq!(collect(rx).await, "forced answer");
    }
}
