//! Recording fakes for the platform, backend and authorizer seams.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::auth::Authorizer;
use crate::config::TelegramConfig;
use crate::llm::ChatBackend;
use crate::platform::{
    BotIdentity, ChatAction, ChatKind, EntityKind, IncomingMessage, MessageEntity, Transport,
};

pub const BOT_ID: u64 = 999;
pub const BOT_USERNAME: &str = "relay_bot";
pub const ADMIN_ID: u64 = 42;
pub const CHAT_ID: i64 = 1001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { chat_id: i64, text: String },
    Action { chat_id: i64, action: ChatAction },
    Prompt(String),
    ResetThread,
    RefreshSession,
}

/// Ordered record of every collaborator call, shared between fakes
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }
}

pub struct FakeTransport {
    pub log: CallLog,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.log.push(Call::Send {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        self.log.push(Call::Action { chat_id, action });
        Ok(())
    }

    async fn get_me(&self) -> Result<BotIdentity> {
        Ok(identity())
    }
}

pub struct FakeBackend {
    pub log: CallLog,
    pub reply: String,
    pub fail: bool,
}

impl FakeBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            reply: "pong".to_string(),
            fail: false,
        }
    }

    pub fn failing(log: CallLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn send(&self, prompt: &str) -> Result<String> {
        self.log.push(Call::Prompt(prompt.to_string()));
        if self.fail {
            anyhow::bail!("backend unavailable");
        }
        Ok(self.reply.clone())
    }

    async fn reset_thread(&self) -> Result<()> {
        self.log.push(Call::ResetThread);
        if self.fail {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<()> {
        self.log.push(Call::RefreshSession);
        if self.fail {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }
}

pub struct FakeAuthorizer(pub bool);

#[async_trait]
impl Authorizer for FakeAuthorizer {
    async fn authenticate(&self, _message: &IncomingMessage) -> Result<bool> {
        Ok(self.0)
    }
}

pub fn identity() -> BotIdentity {
    BotIdentity {
        id: BOT_ID,
        username: BOT_USERNAME.to_string(),
    }
}

pub fn settings() -> Arc<TelegramConfig> {
    Arc::new(TelegramConfig {
        bot_token: "token".to_string(),
        chat_cmd: vec!["/chat".to_string(), ".".to_string()],
        user_ids: vec![ADMIN_ID],
        group_ids: Vec::new(),
    })
}

/// Plain private message from a non-admin user
pub fn message(text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT_ID,
        chat_kind: ChatKind::Private,
        chat_title: None,
        sender_id: Some(7),
        sender_name: "Ada".to_string(),
        sender_username: Some("ada".to_string()),
        text: text.to_string(),
        entities: None,
        reply_to_user_id: None,
    }
}

/// Message whose first `command_len` UTF-16 units are a bot command entity
pub fn command_message(text: &str, command_len: usize) -> IncomingMessage {
    IncomingMessage {
        entities: Some(vec![MessageEntity {
            kind: EntityKind::BotCommand,
            offset: 0,
            length: command_len,
        }]),
        ..message(text)
    }
}

pub fn in_group(mut message: IncomingMessage) -> IncomingMessage {
    message.chat_kind = ChatKind::Group;
    message.chat_id = -100_500;
    message.chat_title = Some("Lounge".to_string());
    message
}
