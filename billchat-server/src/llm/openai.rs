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

//! OpenAI-backed [`LlmProvider`].

use super::{LlmProvider, ToolCallRequest, ToolSpec, TurnMessage};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub struct OpenAiProvider {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: OpenAIClient::with_config(config),
            model,
            temperature,
        }
    }

    fn convert_messages(
        &self,
        messages: &[TurnMessage],
    ) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
        let mut converted = Vec::with_capacity(messages.len());

        for message in messages {
            let m = match message {
                TurnMessage::System(content) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(content.clone())
                        .build()?,
                ),
                TurnMessage::User(content) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content.clone())
                        .build()?,
                ),
                TurnMessage::Assistant(content) => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content.clone())
                        .build()?,
                ),
                TurnMessage::AssistantToolCalls(calls) => {
                    let tool_calls: Vec<ChatCompletionMessageToolCall> = calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect();

                    ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(tool_calls)
                            .build()?,
                    )
                }
                TurnMessage::ToolResult {
                    tool_call_id,
                    content,
                } => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(content.clone())
                        .tool_call_id(tool_call_id.clone())
                        .build()?,
                ),
            };
            converted.push(m);
        }

        Ok(converted)
    }

    fn convert_tools(&self, tools: &[ToolSpec]) -> anyhow::Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|spec| {
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(spec.name.clone())
                            .description(spec.description.clone())
                            .parameters(spec.parameters.clone())
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }
}

/// Accumulator for tool-call fragments arriving across stream deltas.
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn stream_turn(
        &self,
        messages: &[TurnMessage],
        tools: &[ToolSpec],
        tx: &mpsc::Sender<String>,
    ) -> anyhow::Result<Vec<ToolCallRequest>> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(self.convert_messages(messages)?)
            .temperature(self.temperature);

        if !tools.is_empty() {
            builder.tools(self.convert_tools(tools)?);
        }

        let request = builder.build()?;
        let mut stream = self.client.chat().create_stream(request).await?;

        let mut pending: BTreeMap<usize, PendingToolCall> = BTreeMap::new();

        use futures::StreamExt;
        while let Some(result) = stream.next().await {
            let response = result?;
            let Some(choice) = response.choices.first() else {
                continue;
            };

            if let Some(content) = &choice.delta.content {
                if !content.is_empty() && tx.send(content.clone()).await.is_err() {
                    // Receiver dropped: the client went away.
                    return Ok(vec![]);
                }
            }

            if let Some(chunks) = &choice.delta.tool_calls {
                for chunk in chunks {
                    let entry = pending.entry(chunk.index as usize).or_default();
                    if let Some(id) = &chunk.id {
                        entry.id.push_str(id);
                    }
                    if let Some(function) = &chunk.function {
                        if let Some(name) = &function.name {
                            entry.name.push_str(name);
                        }
                        if let Some(arguments) = &function.arguments {
                            entry.arguments.push_str(arguments);
                        }
                    }
                }
            }
        }

        Ok(pending
            .into_values()
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}
