use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::llm::ChatBackend;
use crate::platform::{ChatAction, IncomingMessage, Transport};

/// Surface prefixes collapsing to the canonical one, tried in order.
/// Each may be followed by a single `-` or `_`.
const ALIAS_PREFIXES: [&str; 3] = ["/cgpt", "/chatgpt", "/siri"];
const CANONICAL_PREFIX: &str = "/chatgpt_";

/// Reset alias that predates the prefixed command names
const LEGACY_RESET: &str = "/chatreset";

/// Rewrite an aliased command into its canonical `/chatgpt_<suffix>` form.
/// Commands without a known prefix are returned unchanged.
pub fn normalize(command: &str) -> String {
    for prefix in ALIAS_PREFIXES {
        if let Some(rest) = command.strip_prefix(prefix) {
            let rest = rest.strip_prefix(['-', '_']).unwrap_or(rest);
            return format!("{CANONICAL_PREFIX}{rest}");
        }
    }
    command.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Reset,
    Reload,
    Unsupported,
}

impl Command {
    #[cfg(test)]
    pub const ALL: [Command; 4] = [
        Command::Help,
        Command::Reset,
        Command::Reload,
        Command::Unsupported,
    ];

    /// Resolve a command as issued by the user (mention already stripped)
    pub fn resolve(raw: &str) -> Self {
        if raw == LEGACY_RESET {
            return Command::Reset;
        }
        match normalize(raw).as_str() {
            "/chatgpt_help" => Command::Help,
            "/chatgpt_reset" => Command::Reset,
            "/chatgpt_reload" => Command::Reload,
            _ => Command::Unsupported,
        }
    }

    pub fn requires_admin(self) -> bool {
        matches!(self, Command::Reload)
    }
}

pub const RESET_TEXT: &str = "🔄 The chat thread has been reset. New chat thread started.";
pub const RELOAD_TEXT: &str = "🔄 Session refreshed.";
pub const DENIED_TEXT: &str = "⛔️ Sorry, you do not have the permission to run this command.";
pub const UNSUPPORTED_TEXT: &str = "⚠️ Unsupported command. Run /cgpt_help to see the usage.";

pub fn help_text(chat_cmd: &str, bot_username: &str) -> String {
    format!(
        "To chat with me, you can:\n\
         \u{20} • send messages directly (not supported in groups)\n\
         \u{20} • send messages that start with {chat_cmd}\n\
         \u{20} • reply to my last message\n\n\
         Command list:\n\
         (When using a command in a group, make sure to include a mention after the command, like /cgpt_help@{bot_username}).\n\
         \u{20} • /cgpt_help Show help information.\n\
         \u{20} • /cgpt_reset Reset the current chat thread and start a new one.\n\
         \u{20} • /cgpt_reload (admin required) Refresh the chat session."
    )
}

/// Executes bot commands against the transport and the chat backend
pub struct CommandHandler {
    transport: Arc<dyn Transport>,
    backend: Arc<dyn ChatBackend>,
    settings: Arc<TelegramConfig>,
    bot_username: String,
}

impl CommandHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        backend: Arc<dyn ChatBackend>,
        settings: Arc<TelegramConfig>,
        bot_username: String,
    ) -> Self {
        Self {
            transport,
            backend,
            settings,
            bot_username,
        }
    }

    /// Handle a command. Backend and transport failures propagate unchanged.
    pub async fn handle(
        &self,
        msg: &IncomingMessage,
        command: &str,
        is_mentioned: bool,
    ) -> Result<()> {
        let user = msg.sender_label();
        info!(
            "User {} issued command \"{}\" in {} (is_mentioned={})",
            user,
            command,
            msg.chat_label(),
            is_mentioned
        );

        let resolved = Command::resolve(command);
        if resolved.requires_admin() && !self.settings.is_admin(msg.sender_id) {
            self.transport.send_message(msg.chat_id, DENIED_TEXT).await?;
            warn!("Permission denied for \"{}\" from {}", command, user);
            return Ok(());
        }

        match resolved {
            Command::Help => {
                let text = help_text(self.settings.primary_chat_cmd(), &self.bot_username);
                self.transport.send_message(msg.chat_id, &text).await?;
            }
            Command::Reset => {
                self.transport
                    .send_chat_action(msg.chat_id, ChatAction::Typing)
                    .await?;
                self.backend.reset_thread().await?;
                self.transport.send_message(msg.chat_id, RESET_TEXT).await?;
                info!("Chat thread reset by {}", user);
            }
            Command::Reload => {
                self.transport
                    .send_chat_action(msg.chat_id, ChatAction::Typing)
                    .await?;
                self.backend.refresh_session().await?;
                self.transport.send_message(msg.chat_id, RELOAD_TEXT).await?;
                info!("Session refreshed by {}", user);
            }
            Command::Unsupported => {
                self.transport
                    .send_message(msg.chat_id, UNSUPPORTED_TEXT)
                    .await?;
            }
        }

        Ok(())
    }
}
