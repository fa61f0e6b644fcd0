use embedding::EmbeddingConfig;
use matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Full server configuration, including the embedding and matcher sections
/// handed down to [`ServerState`](crate::state::ServerState).
///
/// Loaded from an optional `picweave` config file layered under
/// `PICWEAVE_SERVER__*` environment variables, e.g.
/// `PICWEAVE_SERVER__PORT=9090` or
/// `PICWEAVE_SERVER__MATCHER__MAX_CONCURRENCY=4`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "ServerConfig::default_bind_addr")]
    pub bind_addr: String,

    /// Listener port.
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Per-request timeout in seconds.
    #[serde(default = "ServerConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request body cap in megabytes. Batch inserts of long descriptions are
    /// the largest expected payloads.
    #[serde(default = "ServerConfig::default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Requests per minute allowed per API key.
    #[serde(default = "ServerConfig::default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Accepted API keys. Empty means a demo key is injected at load time.
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Whether to attach the permissive CORS layer.
    #[serde(default = "ServerConfig::default_enabled")]
    pub enable_cors: bool,

    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "ServerConfig::default_log_level")]
    pub log_level: String,

    /// Whether to install the Prometheus recorder behind `/metrics`.
    #[serde(default = "ServerConfig::default_enabled")]
    pub metrics_enabled: bool,

    /// Embedding provider section.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Matcher section: concurrency, batch deadline, standard width,
    /// allocation options.
    #[serde(default)]
    pub matcher: MatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            port: Self::default_port(),
            timeout_secs: Self::default_timeout_secs(),
            max_body_size_mb: Self::default_max_body_size_mb(),
            rate_limit_per_minute: Self::default_rate_limit_per_minute(),
            api_keys: HashSet::new(),
            enable_cors: Self::default_enabled(),
            log_level: Self::default_log_level(),
            metrics_enabled: Self::default_enabled(),
            embedding: EmbeddingConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    fn default_bind_addr() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_max_body_size_mb() -> usize {
        10
    }

    fn default_rate_limit_per_minute() -> u32 {
        100
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Loads configuration from the optional `picweave` file and the
    /// environment, validates it, and falls back to a demo API key when none
    /// is configured.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("picweave").required(false))
            .add_source(config::Environment::with_prefix("PICWEAVE_SERVER").separator("__"));

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        if config.api_keys.is_empty() {
            tracing::warn!("No API keys configured, using demo key 'demo-key-12345'");
            config.api_keys.insert("demo-key-12345".to_string());
        }

        Ok(config)
    }

    /// Checks the embedding and matcher sections and the cross-section
    /// constraint that the standard width can hold the provider's native
    /// dimension.
    pub fn validate(&self) -> ServerResult<()> {
        self.embedding
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        self.matcher
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        if self.embedding.dimension > self.matcher.standard_width {
            return Err(ServerError::Config(format!(
                "embedding dimension {} exceeds standard width {}",
                self.embedding.dimension, self.matcher.standard_width
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}
