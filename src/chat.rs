use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::llm::ChatBackend;
use crate::platform::{BotIdentity, ChatAction, ChatKind, IncomingMessage, Transport};

/// Telegram rejects messages longer than 4096 characters
const MAX_MESSAGE_LEN: usize = 4000;

pub const EMPTY_PROMPT_TEXT: &str = "💬 Please include a message after the chat command.";
const EMPTY_REPLY_TEXT: &str = "🤷 The model returned an empty response.";

/// Break `text` into pieces of at most `max_len` bytes, cutting after a newline or
/// space when one is available. A piece always holds at least one character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max_len {
        let mut cut = max_len;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        } else if let Some(pos) = rest[..cut].rfind('\n').or_else(|| rest[..cut].rfind(' ')) {
            cut = pos + 1;
        }

        let (head, tail) = rest.split_at(cut);
        chunks.push(head.to_string());
        rest = tail;
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Relays free-form messages to the chat backend
pub struct ChatHandler {
    transport: Arc<dyn Transport>,
    backend: Arc<dyn ChatBackend>,
    settings: Arc<TelegramConfig>,
    bot_id: u64,
}

impl ChatHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        backend: Arc<dyn ChatBackend>,
        settings: Arc<TelegramConfig>,
        identity: &BotIdentity,
    ) -> Self {
        Self {
            transport,
            backend,
            settings,
            bot_id: identity.id,
        }
    }

    /// Prompt to forward, or None when the message is not addressed to the bot.
    /// `triggered` is set when the message started with a chat command entity.
    fn prompt_for<'a>(
        &self,
        msg: &IncomingMessage,
        text: &'a str,
        triggered: bool,
    ) -> Option<&'a str> {
        let addressed = triggered
            || msg.chat_kind == ChatKind::Private
            || msg.reply_to_user_id == Some(self.bot_id);
        if addressed {
            return Some(text.trim());
        }

        // Otherwise a leading text trigger must address the bot; it is cut from the prompt
        self.settings
            .chat_cmd
            .iter()
            .find_map(|trigger| text.strip_prefix(trigger.as_str()))
            .map(str::trim)
    }

    pub async fn handle(&self, msg: &IncomingMessage, text: &str, triggered: bool) -> Result<()> {
        let prompt = match self.prompt_for(msg, text, triggered) {
            Some(prompt) => prompt,
            None => {
                debug!("Ignoring unaddressed message in {}", msg.chat_label());
                return Ok(());
            }
        };

        if prompt.is_empty() {
            self.transport
                .send_message(msg.chat_id, EMPTY_PROMPT_TEXT)
                .await?;
            return Ok(());
        }

        info!(
            "Chat message from {} in {}: {}",
            msg.sender_label(),
            msg.chat_label(),
            prompt
        );

        // Send "typing" indicator
        self.transport
            .send_chat_action(msg.chat_id, ChatAction::Typing)
            .await
            .ok();

        let reply = self.backend.send(prompt).await?;
        if reply.trim().is_empty() {
            self.transport
                .send_message(msg.chat_id, EMPTY_REPLY_TEXT)
                .await?;
            return Ok(());
        }

        for chunk in split_message(&reply, MAX_MESSAGE_LEN) {
            self.transport.send_message(msg.chat_id, &chunk).await?;
        }

        Ok(())
    }
}
