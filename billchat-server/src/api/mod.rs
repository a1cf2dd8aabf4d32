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

pub mod chat;
pub mod health;

pub use chat::chat_stream;
pub use health::health_check;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::llm::ChatEngine;
use crate::middleware::SlidingWindowLimiter;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Too many requests")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimited {
                limit,
                remaining,
                reset_at,
            } => {
                let body = Json(RateLimitedResponse {
                    error: "Too many requests".to_string(),
                    limit,
                    remaining,
                });
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", limit.to_string().parse().unwrap());
                headers.insert(
                    "X-RateLimit-Remaining",
                    remaining.to_string().parse().unwrap(),
                );
                headers.insert(
                    "X-RateLimit-Reset",
                    reset_at.to_rfc3339().parse().unwrap(),
                );
                response
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: message,
                    details: None,
                }),
            )
                .into_response(),
            ApiError::Internal(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    details: Some(details),
                }),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Serialize)]
struct RateLimitedResponse {
    error: String,
    limit: u32,
    remaining: u32,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<SlidingWindowLimiter>,
    pub engine: Arc<ChatEngine>,
}
