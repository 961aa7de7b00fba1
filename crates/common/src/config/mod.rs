//! Configuration management for the agentic RAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Well-known provider variables (GROQ_API_KEY, TAVILY_API_KEY, ...)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Text-generation providers
    #[serde(default)]
    pub llm: LlmConfig,

    /// Evidence providers (web search, private notes)
    #[serde(default)]
    pub search: SearchConfig,

    /// Relevance scoring
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Image analysis
    #[serde(default)]
    pub vision: VisionConfig,

    /// Control loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the OpenAI-compatible primary provider (Groq)
    pub groq_api_key: Option<String>,

    /// Chat completions endpoint of the primary provider
    #[serde(default = "default_groq_endpoint")]
    pub groq_endpoint: String,

    /// Model for the primary provider
    #[serde(default = "default_groq_model")]
    pub groq_model: String,

    /// API key for the Gemini fallback provider (also used for vision)
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL
    #[serde(default = "default_gemini_base")]
    pub gemini_base_url: String,

    /// Gemini model
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Tavily API key (web search disabled when absent)
    pub tavily_api_key: Option<String>,

    /// Tavily search endpoint
    #[serde(default = "default_tavily_endpoint")]
    pub tavily_endpoint: String,

    /// Results requested from each source per hop
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Search depth: basic or advanced
    #[serde(default = "default_search_depth")]
    pub depth: String,

    /// Domain filter: general, academic or constants
    #[serde(default = "default_domain_mode")]
    pub domain_mode: String,

    /// Notes service URL (notes search is a stub and always returns nothing)
    pub notes_service_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    /// Scorer: http (cross-encoder service), lexical, none
    #[serde(default = "default_rerank_provider")]
    pub provider: String,

    /// Cross-encoder service base URL (for provider = http)
    pub endpoint: Option<String>,

    /// Results kept after reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters of item text sent to the scorer
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Concurrent scoring calls allowed across all sessions
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Request timeout in seconds
    #[serde(default = "default_rerank_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisionConfig {
    /// Enable image analysis
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Image fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum images analysed per session
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Hop limit when the request does not specify one
    #[serde(default = "default_max_hops")]
    pub default_max_hops: usize,

    /// Upper bound accepted for a request's hop limit
    #[serde(default = "default_max_hops_cap")]
    pub max_hops_cap: usize,

    /// Minimum result count before sufficiency evaluation
    #[serde(default = "default_evidence_threshold")]
    pub evidence_threshold: usize,

    /// Buffered events per stream before the producer waits
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name reported by /health
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8090 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_groq_endpoint() -> String { "https://api.groq.com/openai/v1/chat/completions".to_string() }
fn default_groq_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_gemini_base() -> String { "https://generativelanguage.googleapis.com/v1beta/models".to_string() }
fn default_gemini_model() -> String { "gemini-2.0-flash".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> usize { 1024 }
fn default_llm_timeout() -> u64 { 60 }
fn default_tavily_endpoint() -> String { "https://api.tavily.com/search".to_string() }
fn default_max_results() -> usize { 10 }
fn default_search_depth() -> String { "advanced".to_string() }
fn default_domain_mode() -> String { "general".to_string() }
fn default_search_timeout() -> u64 { 30 }
fn default_rerank_provider() -> String { "lexical".to_string() }
fn default_top_k() -> usize { 10 }
fn default_max_text_chars() -> usize { 500 }
fn default_max_concurrency() -> usize { 4 }
fn default_rerank_timeout() -> u64 { 30 }
fn default_fetch_timeout() -> u64 { 10 }
fn default_max_images() -> usize { 3 }
fn default_max_hops() -> usize { 3 }
fn default_max_hops_cap() -> usize { 10 }
fn default_evidence_threshold() -> usize { 5 }
fn default_stream_buffer() -> usize { 32 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "agentic-rag".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RERANK__PROVIDER=http
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_provider_env();
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_provider_env();
        Ok(config)
    }

    /// Fill unset provider credentials from their conventional variables
    pub fn apply_provider_env(&mut self) {
        fill_from_env(&mut self.llm.groq_api_key, "GROQ_API_KEY");
        fill_from_env(&mut self.llm.gemini_api_key, "GEMINI_API_KEY");
        fill_from_env(&mut self.search.tavily_api_key, "TAVILY_API_KEY");
        fill_from_env(&mut self.search.notes_service_url, "NOTES_SERVICE_URL");
        fill_from_env(&mut self.rerank.endpoint, "RERANKER_URL");
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Clamp a requested hop limit into the accepted range
    pub fn hop_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.agent.default_max_hops)
            .clamp(1, self.agent.max_hops_cap.max(1))
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    let unset = slot.as_deref().map_or(true, |v| v.trim().is_empty());
    if unset {
        *slot = std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_endpoint: default_groq_endpoint(),
            groq_model: default_groq_model(),
            gemini_api_key: None,
            gemini_base_url: default_gemini_base(),
            gemini_model: default_gemini_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            tavily_endpoint: default_tavily_endpoint(),
            max_results: default_max_results(),
            depth: default_search_depth(),
            domain_mode: default_domain_mode(),
            notes_service_url: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            endpoint: None,
            top_k: default_top_k(),
            max_text_chars: default_max_text_chars(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_rerank_timeout(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_images: default_max_images(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_max_hops: default_max_hops(),
            max_hops_cap: default_max_hops_cap(),
            evidence_threshold: default_evidence_threshold(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            rerank: RerankConfig::default(),
            vision: VisionConfig::default(),
            agent: AgentConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
