use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Thresholds deciding when a background summarization pass runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Growth in message count since the last pass required by the count rule.
    #[serde(default = "default_min_new_messages")]
    pub min_new_messages: usize,
    /// The count rule only applies once the history is strictly larger than this.
    #[serde(default = "default_min_total_messages")]
    pub min_total_messages: usize,
    /// Total characters across the history above which the length rule applies.
    #[serde(default = "default_char_threshold")]
    pub char_threshold: usize,
    /// Growth in message count required by the length rule.
    #[serde(default = "default_min_new_messages_for_length")]
    pub min_new_messages_for_length: usize,
}

fn default_min_new_messages() -> usize {
    10
}

fn default_min_total_messages() -> usize {
    15
}

fn default_char_threshold() -> usize {
    3000
}

fn default_min_new_messages_for_length() -> usize {
    5
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            min_new_messages: default_min_new_messages(),
            min_total_messages: default_min_total_messages(),
            char_threshold: default_char_threshold(),
            min_new_messages_for_length: default_min_new_messages_for_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    // LLM provider (OpenAI-compatible chat completions endpoint)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,

    // Decoding
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    // Transport
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    // Background summarization
    #[serde(default = "default_summary_staleness_secs")]
    pub summary_staleness_secs: u64,

    // Response payload
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    // Kept last: serialized as a nested table
    #[serde(default)]
    pub summarization: SummarizationConfig,
}

fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

fn default_summary_staleness_secs() -> u64 {
    3600
}

fn default_confidence() -> f32 {
    0.9
}

fn default_max_message_chars() -> usize {
    5000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            summary_staleness_secs: default_summary_staleness_secs(),
            confidence: default_confidence(),
            max_message_chars: default_max_message_chars(),
            summarization: SummarizationConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("mindmate_config.toml")
    }

    /// Load config from mindmate_config.toml (next to executable), falling back to
    /// env vars. The credential is always taken from the environment when the file
    /// does not carry one.
    pub fn load() -> Self {
        let path = Self::config_path();

        let mut config = if path.exists() {
            match Self::load_from(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("{:#}", e);
                    tracing::warn!("Falling back to defaults + env vars");
                    Self::from_env()
                }
            }
        } else {
            tracing::warn!("No config file found, using defaults + env vars");
            Self::from_env()
        };

        if config.llm_api_key.is_none() {
            config.llm_api_key = api_key_from(|name| env::var(name).ok());
        }
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        toml::from_str::<BackendConfig>(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| env::var(name).ok());
        config
    }

    /// Apply overrides from any variable source (the process environment in
    /// production, a map in tests).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LLM_API_URL").filter(|v| !v.trim().is_empty()) {
            self.llm_api_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(model) = lookup("LLM_MODEL").filter(|v| !v.trim().is_empty()) {
            self.llm_model = model.trim().to_string();
        }

        if let Some(key) = api_key_from(&lookup) {
            self.llm_api_key = Some(key);
        }

        if let Some(secs) = lookup("LLM_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }

        if let Some(retries) = lookup("LLM_MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.max_retries = retries;
        }

        if let Some(secs) =
            lookup("MINDMATE_SUMMARY_STALENESS_SECS").and_then(|v| v.trim().parse().ok())
        {
            self.summary_staleness_secs = secs;
        }
    }

    /// Startup checks. A missing credential is fatal.
    pub fn validate(&self) -> Result<()> {
        if self
            .llm_api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            bail!("LLM API key is required (set LLM_API_KEY or GOOGLE_API_KEY, or llm_api_key in the config file)");
        }
        if self.llm_api_url.trim().is_empty() {
            bail!("llm_api_url cannot be empty");
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            bail!("confidence must be within 0.0..=1.0, got {}", self.confidence);
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn summary_staleness(&self) -> Duration {
        Duration::from_secs(self.summary_staleness_secs)
    }
}

fn api_key_from<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    ["LLM_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .filter_map(|name| lookup(*name))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}
