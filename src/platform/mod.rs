pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// Kind of an annotated span inside a message's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    BotCommand,
    Mention,
    Other,
}

/// Annotated span, offset and length in UTF-16 code units as delivered by Telegram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

/// A message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    /// Title of the group, None for private chats
    pub chat_title: Option<String>,
    pub sender_id: Option<u64>,
    /// Display name of the user
    pub sender_name: String,
    pub sender_username: Option<String>,
    /// The message text
    pub text: String,
    /// None when the platform attached no entity list at all
    pub entities: Option<Vec<MessageEntity>>,
    /// Author of the message this one replies to
    pub reply_to_user_id: Option<u64>,
}

impl IncomingMessage {
    /// `@username (id)` label used in log records
    pub fn sender_label(&self) -> String {
        let id = self
            .sender_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{} @{} ({})",
            self.sender_name,
            self.sender_username.as_deref().unwrap_or(""),
            id
        )
    }

    pub fn chat_label(&self) -> String {
        match self.chat_kind {
            ChatKind::Private => "private chat".to_string(),
            ChatKind::Group => format!(
                "group {} ({})",
                self.chat_title.as_deref().unwrap_or(""),
                self.chat_id
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Identity of the running bot, fetched once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
}

/// Outbound side of the chat platform
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()>;

    async fn get_me(&self) -> Result<BotIdentity>;
}
