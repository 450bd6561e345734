use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::platform::{ChatKind, IncomingMessage, Transport};

pub const NOT_OWNER_TEXT: &str =
    "⛔️ Sorry, you are not my owner. I cannot chat with you or execute your command.";

/// Decides whether a message may be processed at all
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns false to drop the message. Any denial notice is the authorizer's job.
    async fn authenticate(&self, message: &IncomingMessage) -> Result<bool>;
}

/// Allow-list authorizer backed by the `[telegram]` config section.
/// Empty lists leave the corresponding chat kind open.
pub struct ConfigAuthenticator {
    transport: Arc<dyn Transport>,
    settings: Arc<TelegramConfig>,
}

impl ConfigAuthenticator {
    pub fn new(transport: Arc<dyn Transport>, settings: Arc<TelegramConfig>) -> Self {
        Self {
            transport,
            settings,
        }
    }
}

#[async_trait]
impl Authorizer for ConfigAuthenticator {
    async fn authenticate(&self, message: &IncomingMessage) -> Result<bool> {
        match message.chat_kind {
            ChatKind::Private => {
                if self.settings.user_ids.is_empty() || self.settings.is_admin(message.sender_id)
                {
                    return Ok(true);
                }
                warn!(
                    "Unauthorized private message from {}",
                    message.sender_label()
                );
                self.transport
                    .send_message(message.chat_id, NOT_OWNER_TEXT)
                    .await?;
                Ok(false)
            }
            ChatKind::Group => {
                if self.settings.group_ids.is_empty()
                    || self.settings.group_ids.contains(&message.chat_id)
                {
                    return Ok(true);
                }
                // no notice in groups
                debug!("Ignoring message in unlisted {}", message.chat_label());
                Ok(false)
            }
        }
    }
}
