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

//! The chat endpoint: rate-limit gate, input validation, then a
//! streamed model answer with tool calls resolved server-side.

use crate::api::{ApiError, AppState};
use crate::llm::ChatMessage;
use crate::validation::validate_messages;
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// POST /api/chat
///
/// Ordered steps, each with its own terminal response: resolve the
/// client identifier, gate on the rate limiter (429), validate the
/// message list (400), then stream the generated answer as SSE. Every
/// state here is request-scoped; nothing survives the response.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let client = client_identifier(&headers);
    tracing::info!(client = %client, messages = req.messages.len(), "incoming chat request");

    let decision = state.limiter.check(&client).await;
    if !decision.allowed {
        tracing::warn!(client = %client, "rate limit exceeded");
        return Err(ApiError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        });
    }

    validate_messages(&req.messages).map_err(ApiError::BadRequest)?;

    let rx = state.engine.stream_chat(req.messages).map_err(|e| {
        tracing::error!(error = ?e, "failed to start generation");
        ApiError::Internal(e.to_string())
    })?;
    let stream = ReceiverStream::new(rx)
        .map(|chunk| Ok::<Event, Infallible>(Event::default().data(chunk)));

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    let response_headers = response.headers_mut();
    response_headers.insert(
        "X-RateLimit-Limit",
        decision.limit.to_string().parse().unwrap(),
    );
    response_headers.insert(
        "X-RateLimit-Remaining",
        decision.remaining.to_string().parse().unwrap(),
    );

    Ok(response)
}

/// Client identifier for quota purposes: the first hop of
/// x-forwarded-for, or the documented fallback when unavailable.
fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_identifier_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_identifier(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_identifier_fallback() {
        assert_eq!(client_identifier(&HeaderMap::new()), "anonymous");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        assert_eq!(client_identifier(&headers), "anonymous");
    }
}
