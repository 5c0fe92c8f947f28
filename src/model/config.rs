use serde::Deserialize;
use std::fs;
use std::path::Path;

const ENV_CONFIG_PATH: &str = "TRIAGE_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";

/// Retry tuning for provider calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number between attempts
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Temperature for schema-constrained requests
    pub temperature: f32,
    /// Temperature for free-text requests
    pub unstructured_temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
            unstructured_temperature: 0.7,
            max_tokens: 500,
            request_timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items processed concurrently per job
    pub concurrency: usize,
    /// Messages shorter than this (after trimming) are rejected
    pub min_message_len: usize,
    /// Messages longer than this are truncated
    pub max_message_len: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            min_message_len: 5,
            max_message_len: 1000,
        }
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub batch: BatchConfig,
    pub api_key: Option<String>,
    pub port: u16,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            batch: BatchConfig::default(),
            api_key: None,
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    ///
    /// Environment variables take precedence over the file for the provider
    /// endpoint and model.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let config_path = std::env::var(ENV_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(&config_path).unwrap_or_default();
        let mut llm = file.llm;

        if let Ok(model) = std::env::var(ENV_OPENAI_MODEL) {
            llm.model = model;
        }
        if let Ok(base_url) = std::env::var(ENV_OPENAI_BASE_URL) {
            llm.base_url = base_url;
        }

        let api_key = std::env::var(ENV_OPENAI_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            llm,
            batch: file.batch,
            api_key,
            port,
            host,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => Self::parse_config(&contents, path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    fn parse_config(contents: &str, path: &Path) -> Option<ConfigFile> {
        let contents = contents.trim();
        if contents.is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Some(ConfigFile::default());
        }

        match serde_yaml::from_str(contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                None
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
