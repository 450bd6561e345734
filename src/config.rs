use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// OpenAI-compatible completion service the relay talks to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openrouter,
    Ollama,
    Openai,
}

impl LlmProvider {
    pub fn name(self) -> &'static str {
        match self {
            LlmProvider::Openrouter => "openrouter",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Openai => "openai",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Openai => "https://api.openai.com/v1",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `[llm]` section
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Empty selects the provider's public endpoint
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Upper bound for a single backend request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        match self.base_url.trim_end_matches('/') {
            "" => self.provider.default_base_url(),
            custom => custom,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat triggers; the first one is advertised in the help text
    #[serde(default = "default_chat_cmd")]
    pub chat_cmd: Vec<String>,
    /// Administrators, also allowed to chat privately
    #[serde(default)]
    pub user_ids: Vec<u64>,
    /// Groups the bot answers in. Empty allows every group.
    #[serde(default)]
    pub group_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn is_admin(&self, sender_id: Option<u64>) -> bool {
        sender_id.is_some_and(|id| self.user_ids.contains(&id))
    }

    /// Trigger advertised to users
    pub fn primary_chat_cmd(&self) -> &str {
        self.chat_cmd.first().map(String::as_str).unwrap_or("/chat")
    }
}

fn default_chat_cmd() -> Vec<String> {
    vec!["/chat".to_string()]
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_system_prompt() -> String {
    "You are a helpful assistant chatting with users through Telegram. \
     Keep answers concise unless asked for detail."
        .to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.telegram.chat_cmd.is_empty() {
            anyhow::bail!("telegram.chat_cmd must contain at least one chat trigger");
        }
        if config.telegram.chat_cmd.iter().any(|c| c.trim().is_empty()) {
            anyhow::bail!("telegram.chat_cmd entries must not be blank");
        }

        Ok(config)
    }
}
