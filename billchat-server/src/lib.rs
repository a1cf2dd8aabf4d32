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

pub mod api;
pub mod config;
pub mod govinfo;
pub mod llm;
pub mod middleware;
pub mod search;
pub mod tools;
pub mod validation;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{chat_stream, health_check, AppState};
use config::ServerConfig;
use govinfo::GovInfoClient;
use llm::{ChatEngine, LlmProvider, OpenAiProvider};
use middleware::{InMemoryCounterStore, SlidingWindowLimiter, SystemClock};
use search::{RestDocumentStore, SemanticSearch};
use tools::ToolRegistry;

/// Wire up the collaborators from validated configuration.
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    let govinfo = Arc::new(GovInfoClient::new(&config.govinfo)?);

    let openai_api_key = config.llm.openai_api_key.clone().unwrap_or_default();

    let semantic = if config.search_enabled() {
        // validate() guarantees both halves are present here
        let store = RestDocumentStore::new(
            config.search.store_url.as_deref().unwrap_or_default(),
            config.search.store_key.as_deref().unwrap_or_default(),
        )?;
        tracing::info!("Semantic search enabled");
        Some(Arc::new(SemanticSearch::new(
            &openai_api_key,
            &config.search,
            Arc::new(store),
        )))
    } else {
        tracing::info!("Semantic search disabled (no document store configured)");
        None
    };

    let registry = Arc::new(ToolRegistry::new(govinfo, semantic));

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
        openai_api_key,
        config.llm.model.clone(),
        config.llm.temperature,
    ));
    tracing::info!(model = %config.llm.model, "LLM provider initialized");

    let engine = Arc::new(ChatEngine::new(
        provider,
        registry,
        config.llm.max_tool_rounds,
    ));

    let limiter = Arc::new(SlidingWindowLimiter::new(
        Arc::new(InMemoryCounterStore::new()),
        Arc::new(SystemClock),
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
    ));
    tracing::info!(
        max = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Rate limiter initialized"
    );

    Ok(AppState { limiter, engine })
}

/// Assemble the router. Split out from [`run_server`] so tests can
/// drive it with injected fakes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));

    if config.server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billchat_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Billchat Server");

    // Missing credentials fail here, before any request is served
    config.validate()?;

    let state = build_state(&config)?;
    let router = build_router(state, &config);

    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
