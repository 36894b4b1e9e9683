use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline configuration, built once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL of the WebDriver server
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Chrome binary to launch instead of the driver's default
    #[serde(default)]
    pub chrome_path: Option<String>,

    /// Maximum number of concurrent browser sessions
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Wait after navigation for dynamic content, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause between records (and geocoder lookups), in milliseconds
    #[serde(default = "default_record_delay_ms")]
    pub record_delay_ms: u64,

    /// Pause between address verifications, in milliseconds
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    /// Number of URLs fetched per record
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// Number of search hits requested per query
    #[serde(default = "default_search_results")]
    pub search_results: usize,

    #[serde(default = "default_search_cache_dir")]
    pub search_cache_dir: PathBuf,

    #[serde(default = "default_url_cache_dir")]
    pub url_cache_dir: PathBuf,

    /// Characters that end a sentence when segmenting text
    #[serde(default = "default_sentence_terminators")]
    pub sentence_terminators: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    /// Tencent Maps web service key
    #[serde(default, skip_serializing)]
    pub geocoder_key: Option<String>,
}

/// Retry limits and initial backoff per call site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_fetch_initial_delay_ms")]
    pub fetch_initial_delay_ms: u64,

    #[serde(default = "default_search_initial_delay_ms")]
    pub search_initial_delay_ms: u64,

    #[serde(default = "default_llm_initial_delay_ms")]
    pub llm_initial_delay_ms: u64,
}

/// Settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Context size of the model, in tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_max_workers() -> usize {
    5
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_record_delay_ms() -> u64 {
    1000
}

fn default_verify_delay_ms() -> u64 {
    2000
}

fn default_max_urls() -> usize {
    3
}

fn default_search_results() -> usize {
    10
}

fn default_search_cache_dir() -> PathBuf {
    PathBuf::from("cache/search_results")
}

fn default_url_cache_dir() -> PathBuf {
    PathBuf::from("cache/url_results")
}

fn default_sentence_terminators() -> String {
    "。".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_fetch_initial_delay_ms() -> u64 {
    1000
}

fn default_search_initial_delay_ms() -> u64 {
    2000
}

fn default_llm_initial_delay_ms() -> u64 {
    2000
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_max_tokens() -> usize {
    8192
}

fn default_llm_temperature() -> f32 {
    0.3
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            chrome_path: None,
            max_workers: default_max_workers(),
            settle_delay_ms: default_settle_delay_ms(),
            record_delay_ms: default_record_delay_ms(),
            verify_delay_ms: default_verify_delay_ms(),
            max_urls: default_max_urls(),
            search_results: default_search_results(),
            search_cache_dir: default_search_cache_dir(),
            url_cache_dir: default_url_cache_dir(),
            sentence_terminators: default_sentence_terminators(),
            retry: RetryConfig::default(),
            llm: LlmConfig::default(),
            geocoder_key: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fetch_initial_delay_ms: default_fetch_initial_delay_ms(),
            search_initial_delay_ms: default_search_initial_delay_ms(),
            llm_initial_delay_ms: default_llm_initial_delay_ms(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl RetryConfig {
    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.fetch_initial_delay_ms),
        )
    }

    pub fn search_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.search_initial_delay_ms),
        )
    }

    pub fn llm_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.llm_initial_delay_ms),
        )
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref()).map_err(|e| {
            PipelineError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            PipelineError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment variables read through `lookup`.
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = var("WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        if let Some(path) = var("CHROME_PATH") {
            self.chrome_path = Some(path);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = var("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(max) = var("LLM_MAX_TOKENS") {
            self.llm.max_tokens = max.parse().map_err(|_| {
                PipelineError::Configuration(format!("LLM_MAX_TOKENS is not a number: {}", max))
            })?;
        }
        if let Some(key) = var("TENCENT_MAP_KEY") {
            self.geocoder_key = Some(key);
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Settle delay given in whole seconds, clamped at `u64::MAX` milliseconds
    pub fn set_settle_delay_secs(&mut self, secs: u64) {
        self.settle_delay_ms = secs.saturating_mul(1000);
    }

    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    /// Geocoder key, required for the coordinate pass
    pub fn require_geocoder_key(&self) -> Result<&str> {
        self.geocoder_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::Configuration("TENCENT_MAP_KEY not set".into()))
    }
}
