use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, MessageEntityKind};
use tracing::{error, info, warn};

use crate::platform::{
    BotIdentity, ChatAction, ChatKind, EntityKind, IncomingMessage, MessageEntity, Transport,
};
use crate::router::MessageRouter;

/// Telegram implementation of the outbound transport
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        let action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(ChatId(chat_id), action)
            .await
            .with_context(|| format!("Failed to send chat action to chat {}", chat_id))?;
        Ok(())
    }

    async fn get_me(&self) -> Result<BotIdentity> {
        let me = self
            .bot
            .get_me()
            .await
            .context("Failed to fetch bot identity")?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone().unwrap_or_default(),
        })
    }
}

/// Publish the command list shown in Telegram's command menu
pub async fn register_commands(bot: &Bot) -> Result<()> {
    bot.set_my_commands(vec![
        BotCommand::new("cgpt_help", "Show help information"),
        BotCommand::new("cgpt_reset", "Reset the chat thread and start a new one"),
        BotCommand::new("cgpt_reload", "Refresh the chat session (admin required)"),
    ])
    .await
    .context("Failed to register bot commands")?;
    Ok(())
}

/// Run the Telegram platform until the dispatcher stops
pub async fn run(bot: Bot, router: Arc<MessageRouter>) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, router: Arc<MessageRouter>) -> ResponseResult<()> {
    let incoming = match to_incoming(&msg) {
        Some(incoming) => incoming,
        None => return Ok(()),
    };

    if let Err(e) = router.handle(&incoming).await {
        error!(
            "Error handling message from {} in {}: {:#}",
            incoming.sender_label(),
            incoming.chat_label(),
            e
        );
    }

    Ok(())
}

/// Convert a Telegram message into the platform-agnostic form; non-text messages yield None
fn to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?.to_string();
    let from = msg.from.as_ref();

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        chat_kind: if msg.chat.is_private() {
            ChatKind::Private
        } else {
            ChatKind::Group
        },
        chat_title: msg.chat.title().map(str::to_string),
        sender_id: from.map(|user| user.id.0),
        sender_name: from.map(|user| user.full_name()).unwrap_or_default(),
        sender_username: from.and_then(|user| user.username.clone()),
        text,
        entities: msg
            .entities()
            .map(|entities| entities.iter().map(convert_entity).collect()),
        reply_to_user_id: msg
            .reply_to_message()
            .and_then(|reply| reply.from.as_ref())
            .map(|user| user.id.0),
    })
}

fn convert_entity(entity: &teloxide::types::MessageEntity) -> MessageEntity {
    let kind = match entity.kind {
        MessageEntityKind::BotCommand => EntityKind::BotCommand,
        MessageEntityKind::Mention => EntityKind::Mention,
        _ => EntityKind::Other,
    };
    MessageEntity {
        kind,
        offset: entity.offset,
        length: entity.length,
    }
}
