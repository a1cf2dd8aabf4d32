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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Billchat Server Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub govinfo: GovInfoConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:8080")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Hard wall-clock budget for one request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GovInfoConfig {
    /// GovInfo API key (required)
    pub api_key: Option<String>,

    /// GovInfo API base URL
    #[serde(default = "default_govinfo_base_url")]
    pub base_url: String,

    /// Per-call upstream timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// OpenAI API key (required)
    pub openai_api_key: Option<String>,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum sequential tool-call rounds before forcing a final answer
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window per client IP
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,

    /// Time window in seconds
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_max_requests(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

/// Semantic search is optional: it is wired in only when both the
/// store URL and key are configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Document/embedding store base URL
    pub store_url: Option<String>,

    /// Document/embedding store API key
    pub store_key: Option<String>,

    /// Cosine similarity threshold for matches
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Number of matches to request
    #[serde(default = "default_match_count")]
    pub match_count: u32,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            store_key: None,
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            embedding_model: default_embedding_model(),
        }
    }
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_enable_cors() -> bool {
    true
}

fn default_govinfo_base_url() -> String {
    "https://api.govinfo.gov".to_string()
}

fn default_upstream_timeout() -> u64 {
    15
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tool_rounds() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.7
}

fn default_rate_limit_max_requests() -> u32 {
    50
}

fn default_rate_limit_window_secs() -> u64 {
    3600
}

fn default_match_threshold() -> f32 {
    0.7
}

fn default_match_count() -> u32 {
    10
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

impl Default for GovInfoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_govinfo_base_url(),
            request_timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: default_model(),
            max_tool_rounds: default_max_tool_rounds(),
            temperature: default_temperature(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            govinfo: GovInfoConfig::default(),
            llm: LlmConfig::default(),
            rate_limit: RateLimitConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - BILLCHAT_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:8080)
    /// - BILLCHAT_REQUEST_TIMEOUT: whole-request budget in seconds (default: 30)
    /// - GOV_INFO_API_KEY: GovInfo API key (required)
    /// - GOV_INFO_BASE_URL: GovInfo base URL (default: https://api.govinfo.gov)
    /// - OPENAI_API_KEY: OpenAI API key (required)
    /// - OPENAI_API_MODEL: chat model (default: gpt-4o-mini)
    /// - RATE_LIMIT_MAX: max requests per window (default: 50)
    /// - RATE_LIMIT_WINDOW: window in seconds (default: 3600)
    /// - SEARCH_STORE_URL / SEARCH_STORE_KEY: document store (optional)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BILLCHAT_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("BILLCHAT_REQUEST_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                config.server.request_timeout_secs = val;
            }
        }

        if let Ok(key) = std::env::var("GOV_INFO_API_KEY") {
            config.govinfo.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("GOV_INFO_BASE_URL") {
            config.govinfo.base_url = url;
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }

        if let Ok(model) = std::env::var("OPENAI_API_MODEL") {
            config.llm.model = model;
        }

        if let Ok(max) = std::env::var("RATE_LIMIT_MAX") {
            if let Ok(val) = max.parse() {
                config.rate_limit.max_requests = val;
            }
        }

        if let Ok(window) = std::env::var("RATE_LIMIT_WINDOW") {
            if let Ok(val) = window.parse() {
                config.rate_limit.window_secs = val;
            }
        }

        if let Ok(url) = std::env::var("SEARCH_STORE_URL") {
            config.search.store_url = Some(url);
        }

        if let Ok(key) = std::env::var("SEARCH_STORE_KEY") {
            config.search.store_key = Some(key);
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        if std::env::var("BILLCHAT_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("BILLCHAT_REQUEST_TIMEOUT").is_ok() {
            config.server.request_timeout_secs = env_config.server.request_timeout_secs;
        }
        if std::env::var("GOV_INFO_API_KEY").is_ok() {
            config.govinfo.api_key = env_config.govinfo.api_key;
        }
        if std::env::var("GOV_INFO_BASE_URL").is_ok() {
            config.govinfo.base_url = env_config.govinfo.base_url;
        }
        if std::env::var("OPENAI_API_KEY").is_ok() {
            config.llm.openai_api_key = env_config.llm.openai_api_key;
        }
        if std::env::var("OPENAI_API_MODEL").is_ok() {
            config.llm.model = env_config.llm.model;
        }
        if std::env::var("RATE_LIMIT_MAX").is_ok() {
            config.rate_limit.max_requests = env_config.rate_limit.max_requests;
        }
        if std::env::var("RATE_LIMIT_WINDOW").is_ok() {
            config.rate_limit.window_secs = env_config.rate_limit.window_secs;
        }
        if std::env::var("SEARCH_STORE_URL").is_ok() {
            config.search.store_url = env_config.search.store_url;
        }
        if std::env::var("SEARCH_STORE_KEY").is_ok() {
            config.search.store_key = env_config.search.store_key;
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Whether the semantic-search variant is configured.
    pub fn search_enabled(&self) -> bool {
        self.search.store_url.is_some() && self.search.store_key.is_some()
    }

    /// Validate configuration. Missing required credentials fail here,
    /// at startup, not at first use.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.govinfo.api_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("GOV_INFO_API_KEY is required but not configured");
        }

        if self.llm.openai_api_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("OPENAI_API_KEY is required but not configured");
        }

        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be at least 1");
        }

        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be at least 1");
        }

        // Semantic search needs both halves or neither
        if self.search.store_url.is_some() != self.search.store_key.is_some() {
            anyhow::bail!(
                "SEARCH_STORE_URL and SEARCH_STORE_KEY must be configured together"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.govinfo.api_key = Some("govinfo-key".to_string());
        config.llm.openai_api_key = Some("openai-key".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.rate_limit.max_requests, 50);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.govinfo.request_timeout_secs, 15);
        assert!(!config.search_enabled());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let mut config = configured();
        assert!(config.validate().is_ok());

        config.govinfo.api_key = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_half_configured_search() {
        let mut config = configured();
        config.search.store_url = Some("https://store.example".to_string());
        assert!(config.validate().is_err());

        config.search.store_key = Some("store-key".to_string());
        assert!(config.validate().is_ok());
        assert!(config.search_enabled());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("BILLCHAT_HTTP_ADDR", "0.0.0.0:9090");
        std::env::set_var("RATE_LIMIT_MAX", "7");

        let config = ServerConfig::from_env();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9090");
        assert_eq!(config.rate_limit.max_requests, 7);

        std::env::remove_var("BILLCHAT_HTTP_ADDR");
        std::env::remove_var("RATE_LIMIT_MAX");
    }

    #[test]
    fn test_from_file() {
        let toml = r#"
            [govinfo]
            api_key = "g"

            [llm]
            openai_api_key = "o"
            model = "gpt-4o"

            [rate_limit]
            max_requests = 5
            window_secs = 60
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billchat.toml");
        std::fs::write(&path, toml).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.rate_limit.max_requests, 5);
        // Unspecified sections keep their defaults
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }
}
