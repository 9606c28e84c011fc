use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Process-wide configuration. Built once at startup from an optional JSON
/// file and passed by reference into each component; secrets may instead
/// come from the environment (see `AnthropicConfig` / `DiscordConfig`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database file path. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_scrape_interval_hours")]
    pub scrape_interval_hours: u64,
    #[serde(default)]
    pub leetcode: LeetCodeConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeetCodeConfig {
    /// Posts requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on pages per sweep.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Fixed delay before each detail-page attempt. A throttle, not a knob
    /// to tune for speed.
    #[serde(default = "default_politeness_delay_secs")]
    pub politeness_delay_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    /// API key; falls back to ANTHROPIC_API_KEY when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token; falls back to DISCORD_TOKEN when absent.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    /// Base URL for deep links in the notification embed.
    #[serde(default = "default_interview_base_url")]
    pub interview_base_url: String,
}

fn default_scrape_interval_hours() -> u64 {
    6
}
fn default_page_size() -> usize {
    50
}
fn default_max_pages() -> usize {
    5
}
fn default_politeness_delay_secs() -> u64 {
    2
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_model_id() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_channel_id() -> String {
    "1455048561275306074".to_string()
}
fn default_interview_base_url() -> String {
    "https://roundz.ai/interviews".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            scrape_interval_hours: default_scrape_interval_hours(),
            leetcode: LeetCodeConfig::default(),
            anthropic: AnthropicConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl Default for LeetCodeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            politeness_delay_secs: default_politeness_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: default_model_id(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: default_channel_id(),
            interview_base_url: default_interview_base_url(),
        }
    }
}

impl Config {
    /// Load configuration. An explicit path must exist; otherwise the
    /// default config location is used if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_path();
                match default {
                    Some(p) if p.exists() => Self::from_file(&p),
                    _ => Ok(Config::default()),
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "roundz")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.scrape_interval_hours, 6);
        assert_eq!(config.leetcode.page_size, 50);
        assert_eq!(config.leetcode.max_pages, 5);
        assert_eq!(config.leetcode.politeness_delay_secs, 2);
        assert!(config.anthropic.api_key.is_none());
        assert!(config.discord.token.is_none());
        assert!(config.discord.interview_base_url.starts_with("https://"));
    }

    #[test]
    fn test_partial_file_overrides() {
        let raw = r#"{
            "scrape_interval_hours": 1,
            "leetcode": { "max_pages": 2 },
            "anthropic": { "api_key": "k-test" },
            "discord": { "token": "t", "channel_id": "42" }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.scrape_interval_hours, 1);
        assert_eq!(config.leetcode.max_pages, 2);
        // Unspecified fields keep their defaults
        assert_eq!(config.leetcode.page_size, 50);
        assert_eq!(config.anthropic.api_key.as_deref(), Some("k-test"));
        assert_eq!(config.discord.channel_id, "42");
    }
}
