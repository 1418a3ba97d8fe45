use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ChatConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub rate_limit: RateLimitConfig,
    pub citations: CitationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub professional_temperature: f32,
    pub casual_temperature: f32,
    pub timeout_secs: u64,
    pub primary: BackendConfig,
    pub fallback: Option<BackendConfig>,
}

/// One OpenAI-compatible chat completions endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    /// Answer greetings and thanks without querying the index.
    pub skip_small_talk: bool,
    pub index_host: String,
    pub namespaces: Vec<String>,
    pub top_k: usize,
    pub top_n: usize,
    pub min_rerank_score: f64,
    pub fallback_count: usize,
    pub embedding_model: String,
    pub embedding_url: String,
    pub rerank_model: String,
    pub rerank_url: String,
    pub openai_api_key_env: String,
    pub pinecone_api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CitationConfig {
    /// Use identifiers from a used-sources block whose end marker never arrived.
    pub trust_unterminated: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            log_level: "info".into(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            professional_temperature: 0.5,
            casual_temperature: 0.8,
            timeout_secs: 60,
            primary: BackendConfig::groq(),
            fallback: Some(BackendConfig::openrouter()),
        }
    }
}

impl BackendConfig {
    pub fn groq() -> Self {
        Self {
            name: "groq".into(),
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".into(),
            api_key_env: "GROQ_API_KEY".into(),
        }
    }

    pub fn openrouter() -> Self {
        Self {
            name: "openrouter".into(),
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "meta-llama/llama-4-maverick-instruct".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_small_talk: false,
            index_host: String::new(),
            namespaces: vec![
                "personal_life".into(),
                "professional_life".into(),
                "about_rag".into(),
            ],
            top_k: 10,
            top_n: 3,
            min_rerank_score: 0.45,
            fallback_count: 3,
            embedding_model: "text-embedding-3-small".into(),
            embedding_url: "https://api.openai.com/v1/embeddings".into(),
            rerank_model: "bge-reranker-v2-m3".into(),
            rerank_url: "https://api.pinecone.io/rerank".into(),
            openai_api_key_env: "OPENAI_API_KEY".into(),
            pinecone_api_key_env: "PINECONE_API_KEY".into(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 20,
        }
    }
}

/// Returns `~/.portfolio-chat/`
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".portfolio-chat")
}

/// Returns the default config file path: `~/.portfolio-chat/config.toml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

impl ChatConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ChatConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PORTFOLIO_CHAT_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("PORTFOLIO_CHAT_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid PORTFOLIO_CHAT_PORT"),
            }
        }
        if let Ok(val) = std::env::var("PORTFOLIO_CHAT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("PINECONE_INDEX_HOST") {
            self.retrieval.index_host = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port != 0, "server.port must be > 0");
        anyhow::ensure!(
            self.rate_limit.max_requests > 0,
            "rate_limit.max_requests must be > 0"
        );
        anyhow::ensure!(
            self.rate_limit.window_secs > 0,
            "rate_limit.window_secs must be > 0"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.retrieval.min_rerank_score),
            "retrieval.min_rerank_score must be in [0.0, 1.0]"
        );
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be > 0");
        Ok(())
    }

    /// `host:port` the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ChatConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.generation.max_tokens, 1024);
        assert_eq!(config.generation.primary.name, "groq");
        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.retrieval.namespaces.len(), 3);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert!(!config.citations.trust_unterminated);
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
port = 8080

[generation.primary]
name = "local"
base_url = "http://localhost:11434/v1"
model = "llama3"
api_key_env = "LOCAL_KEY"

[retrieval]
namespaces = ["professional_life"]
min_rerank_score = 0.6

[citations]
trust_unterminated = true
"#;
        let config: ChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generation.primary.model, "llama3");
        assert_eq!(config.retrieval.namespaces, vec!["professional_life"]);
        assert_eq!(config.retrieval.min_rerank_score, 0.6);
        assert!(config.citations.trust_unterminated);
        // defaults still apply for unset fields
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(
            config.generation.fallback.as_ref().map(|b| b.name.as_str()),
            Some("openrouter")
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ChatConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = ChatConfig::default();
        config.retrieval.min_rerank_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ChatConfig::default();
        std::env::set_var("PORTFOLIO_CHAT_HOST", "0.0.0.0");
        std::env::set_var("PORTFOLIO_CHAT_PORT", "9999");
        std::env::set_var("PORTFOLIO_CHAT_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.bind_addr(), "0.0.0.0:9999");

        // Clean up
        std::env::remove_var("PORTFOLIO_CHAT_HOST");
        std::env::remove_var("PORTFOLIO_CHAT_PORT");
        std::env::remove_var("PORTFOLIO_CHAT_LOG_LEVEL");
    }
}
