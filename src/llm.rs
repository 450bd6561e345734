use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::LlmConfig;

/// Conversational backend the bot relays chats to
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a user prompt on the current thread and return the reply
    async fn send(&self, prompt: &str) -> Result<String>;

    /// Drop the current thread; the next prompt starts a new one
    async fn reset_thread(&self) -> Result<()>;

    /// Re-establish the backend session
    async fn refresh_session(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Conversation history plus a counter bumped on every reset
#[derive(Default)]
struct Thread {
    messages: Vec<ChatMessage>,
    generation: u64,
}

/// OpenAI-compatible chat completion client holding a single conversation thread.
/// The thread lock is never held across a request.
pub struct LlmClient {
    client: RwLock<reqwest::Client>,
    config: LlmConfig,
    thread: Mutex<Thread>,
}

fn build_http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: RwLock::new(build_http_client(&config)?),
            config,
            thread: Mutex::new(Thread::default()),
        })
    }

    fn system_message(&self) -> ChatMessage {
        ChatMessage::new("system", &self.config.system_prompt)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending request to {}: {}", self.config.provider, url);

        let client = self.client.read().await.clone();
        let response = self
            .authorize(client.post(&url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.config.provider))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.config.provider, status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.config.provider))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .with_context(|| format!("No response from {}", self.config.provider))
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn send(&self, prompt: &str) -> Result<String> {
        let (mut messages, generation) = {
            let thread = self.thread.lock().await;
            (thread.messages.clone(), thread.generation)
        };
        if messages.is_empty() {
            messages.push(self.system_message());
        }
        let user_msg = ChatMessage::new("user", prompt);
        messages.push(user_msg.clone());

        let reply = self.complete(&messages).await?;
        let content = reply.content.clone().unwrap_or_default();

        // Only a completed exchange is kept, and only on the thread it was asked on
        let mut thread = self.thread.lock().await;
        if thread.generation != generation {
            debug!("Discarding reply that arrived after a thread reset");
            return Ok(content);
        }
        if thread.messages.is_empty() {
            let system = self.system_message();
            thread.messages.push(system);
        }
        thread.messages.push(user_msg);
        thread.messages.push(reply);

        Ok(content)
    }

    async fn reset_thread(&self) -> Result<()> {
        let mut thread = self.thread.lock().await;
        let dropped = thread.messages.len();
        thread.messages.clear();
        thread.generation += 1;
        info!("Chat thread reset ({} messages dropped)", dropped);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<()> {
        let client = build_http_client(&self.config)?;
        let url = format!("{}/models", self.config.effective_base_url());

        let response = self
            .authorize(client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.config.provider))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} session refresh failed ({}): {}",
                self.config.provider,
                status,
                error_body
            );
        }

        *self.client.write().await = client;
        info!("{} session refreshed", self.config.provider);
        Ok(())
    }
}
