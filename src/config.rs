use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::tips::Tips;

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_TOKEN";
/// Environment variable holding the LLM API key.
pub const LLM_API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression, evaluated in UTC.
    #[serde(default = "default_broadcast_cron")]
    pub cron: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_broadcast_cron(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Replaces the built-in list; an empty array is a parse error.
    #[serde(default)]
    pub tips: Tips,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            llm: LlmConfig::default(),
            broadcast: BroadcastConfig::default(),
            tips: Tips::default(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_system_prompt() -> String {
    "You're a cybersecurity expert providing concise, actionable advice.".to_string()
}

fn default_true() -> bool {
    true
}

fn default_broadcast_cron() -> String {
    "0 0 9 * * *".to_string()
}

impl Config {
    /// Load the config file (if present), then overlay secrets from the
    /// process environment and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay the two secrets. Empty values from the lookup are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TELEGRAM_TOKEN_VAR).filter(|v| !v.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(key) = lookup(LLM_API_KEY_VAR).filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!(
                "Telegram bot token is missing (set {} or [telegram] bot_token)",
                TELEGRAM_TOKEN_VAR
            );
        }
        if self.llm.api_key.is_empty() && self.llm.provider != LlmProvider::Ollama {
            anyhow::bail!(
                "LLM API key is missing for provider '{}' (set {} or [llm] api_key)",
                self.llm.provider,
                LLM_API_KEY_VAR
            );
        }
        if self.llm.model.is_empty() {
            anyhow::bail!("[llm] model must not be empty");
        }
        Ok(())
    }
}
