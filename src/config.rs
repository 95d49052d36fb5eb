use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const SLACK_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_daily_word_time")]
    pub daily_word_time: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "default_affirmation_tokens")]
    pub affirmation_tokens: Vec<String>,
    #[serde(default = "default_max_generation_attempts")]
    pub max_generation_attempts: u32,
    #[serde(default = "default_quiz_tolerance")]
    pub quiz_tolerance: String,
    #[serde(default = "default_event_cache_ttl_secs")]
    pub event_cache_ttl_secs: u64,
    #[serde(default = "default_event_cache_max_size")]
    pub event_cache_max_size: usize,
    #[serde(default = "default_watched_threads")]
    pub watched_threads: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_daily_word_time() -> String {
    "09:00".to_string()
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_affirmation_tokens() -> Vec<String> {
    vec!["1".to_string()]
}
fn default_max_generation_attempts() -> u32 {
    5
}
fn default_quiz_tolerance() -> String {
    "moderate".to_string()
}
fn default_event_cache_ttl_secs() -> u64 {
    3600
}
fn default_event_cache_max_size() -> usize {
    10_000
}
fn default_watched_threads() -> usize {
    3
}
fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vocabot")
        .to_string_lossy()
        .to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            base_url: default_openai_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daily_word_time: default_daily_word_time(),
            poll_interval_secs: default_poll_interval_secs(),
            theme: None,
            affirmation_tokens: default_affirmation_tokens(),
            max_generation_attempts: default_max_generation_attempts(),
            quiz_tolerance: default_quiz_tolerance(),
            event_cache_ttl_secs: default_event_cache_ttl_secs(),
            event_cache_max_size: default_event_cache_max_size(),
            watched_threads: default_watched_threads(),
            data_dir: default_data_dir(),
            openai: OpenAiConfig::default(),
            slack: SlackConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.validate();
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocabot")
            .join("config.toml")
    }

    /// Clamp numbers into usable ranges and reset values that cannot be parsed.
    pub fn validate(&mut self) {
        if NaiveTime::parse_from_str(&self.daily_word_time, "%H:%M").is_err() {
            self.daily_word_time = default_daily_word_time();
        }
        self.poll_interval_secs = self.poll_interval_secs.clamp(5, 3600);
        self.max_generation_attempts = self.max_generation_attempts.clamp(1, 20);
        self.watched_threads = self.watched_threads.clamp(1, 50);
        self.event_cache_max_size = self.event_cache_max_size.max(10);

        self.affirmation_tokens = self
            .affirmation_tokens
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if self.affirmation_tokens.is_empty() {
            self.affirmation_tokens = default_affirmation_tokens();
        }

        if self.theme.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.theme = None;
        }
        self.openai.temperature = self.openai.temperature.clamp(0.0, 2.0);
        self.openai.max_retries = self.openai.max_retries.clamp(1, 10);
    }

    pub fn daily_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.daily_word_time, "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default())
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_defaults_from_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daily_word_time, "09:00");
        assert_eq!(config.affirmation_tokens, vec!["1"]);
        assert_eq!(config.max_generation_attempts, 5);
        assert_eq!(config.openai.model, "gpt-4o");
        assert!(config.theme.is_none());
        assert!(config.data_dir.contains("vocabot"));
    }

    #[test]
    fn test_config_partial_sections() {
        let toml_str = r#"
theme = "ocean"
affirmation_tokens = ["1", "knew it"]

[openai]
model = "gpt-4o-mini"

[slack]
channel_id = "C123"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.theme.as_deref(), Some("ocean"));
        assert_eq!(config.affirmation_tokens.len(), 2);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.max_tokens, 300);
        assert_eq!(config.slack.channel_id, "C123");
        assert_eq!(config.slack.timeout_secs, 30);
    }

    #[test]
    fn test_missing_slack_section_keeps_timeout() {
        let config: Config = toml::from_str("theme = \"ocean\"").unwrap();
        assert_eq!(config.slack.timeout_secs, 30);
        assert!(config.slack.channel_id.is_empty());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.daily_word_time, deserialized.daily_word_time);
        assert_eq!(config.affirmation_tokens, deserialized.affirmation_tokens);
        assert_eq!(config.openai.base_url, deserialized.openai.base_url);
    }

    #[test]
    fn test_validate_resets_bad_values() {
        let mut config = Config::default();
        config.daily_word_time = "25:99".to_string();
        config.max_generation_attempts = 0;
        config.poll_interval_secs = 1;
        config.affirmation_tokens = vec!["  ".to_string()];
        config.theme = Some(" ".to_string());
        config.validate();

        assert_eq!(config.daily_word_time, "09:00");
        assert_eq!(config.max_generation_attempts, 1);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.affirmation_tokens, vec!["1"]);
        assert!(config.theme.is_none());
    }

    #[test]
    fn test_daily_time_parses() {
        let mut config = Config::default();
        config.daily_word_time = "07:30".to_string();
        config.validate();
        assert_eq!(config.daily_time(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    }
}
