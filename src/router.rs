use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::auth::Authorizer;
use crate::chat::ChatHandler;
use crate::commands::CommandHandler;
use crate::config::TelegramConfig;
use crate::llm::ChatBackend;
use crate::platform::{BotIdentity, EntityKind, IncomingMessage, Transport};

/// Structure extracted from a raw message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedMessage {
    /// Body with any leading command removed, trimmed
    pub text: String,
    /// Leading command without the bot mention, empty when there is none
    pub command: String,
    pub is_mentioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    DispatchCommand { command: String, is_mentioned: bool },
    PassToChat(String),
    /// Text that looks like a command the platform did not mark as one
    IgnoreCommandLike,
}

/// Byte index of the first char starting at or after `units` UTF-16 code units
fn utf16_to_byte_index(text: &str, units: usize) -> usize {
    let mut seen = 0;
    for (idx, ch) in text.char_indices() {
        if seen >= units {
            return idx;
        }
        seen += ch.len_utf16();
    }
    text.len()
}

/// Split a message into command, mention flag and body.
/// Only a bot command entity at offset 0 counts; later ones are ignored.
pub fn parse(msg: &IncomingMessage, bot: &BotIdentity) -> ParsedMessage {
    let span = msg
        .entities
        .iter()
        .flatten()
        .find(|entity| entity.kind == EntityKind::BotCommand && entity.offset == 0);

    let span = match span {
        Some(span) => span,
        None => {
            return ParsedMessage {
                text: msg.text.clone(),
                ..Default::default()
            }
        }
    };

    let end = utf16_to_byte_index(&msg.text, span.length);
    let (command_raw, rest) = msg.text.split_at(end);

    let mention = format!("@{}", bot.username);
    let (command, is_mentioned) = match command_raw.strip_suffix(mention.as_str()) {
        Some(command) => (command, true),
        None => (command_raw, false),
    };

    ParsedMessage {
        text: rest.trim().to_string(),
        command: command.to_string(),
        is_mentioned,
    }
}

pub fn route(parsed: &ParsedMessage, chat_cmd: &[String]) -> RoutingDecision {
    if !parsed.command.is_empty() && !chat_cmd.contains(&parsed.command) {
        RoutingDecision::DispatchCommand {
            command: parsed.command.clone(),
            is_mentioned: parsed.is_mentioned,
        }
    } else if parsed.command.is_empty() && parsed.text.trim_start().starts_with('/') {
        RoutingDecision::IgnoreCommandLike
    } else {
        RoutingDecision::PassToChat(parsed.text.clone())
    }
}

/// Entry point for every inbound message: authorize, parse, route, act
pub struct MessageRouter {
    identity: BotIdentity,
    settings: Arc<TelegramConfig>,
    authorizer: Arc<dyn Authorizer>,
    commands: CommandHandler,
    chat: ChatHandler,
}

impl MessageRouter {
    /// `identity` comes from the platform at startup and stays fixed afterwards
    pub fn new(
        identity: BotIdentity,
        settings: Arc<TelegramConfig>,
        authorizer: Arc<dyn Authorizer>,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let commands = CommandHandler::new(
            transport.clone(),
            backend.clone(),
            settings.clone(),
            identity.username.clone(),
        );
        let chat = ChatHandler::new(transport, backend, settings.clone(), &identity);
        Self {
            identity,
            settings,
            authorizer,
            commands,
            chat,
        }
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    pub async fn handle(&self, msg: &IncomingMessage) -> Result<()> {
        debug!("Incoming message: {:?}", msg);

        if !self.authorizer.authenticate(msg).await? {
            return Ok(());
        }

        let parsed = parse(msg, &self.identity);
        match route(&parsed, &self.settings.chat_cmd) {
            RoutingDecision::DispatchCommand {
                command,
                is_mentioned,
            } => self.commands.handle(msg, &command, is_mentioned).await,
            RoutingDecision::IgnoreCommandLike => {
                debug!(
                    "Ignoring message with a command the parser hasn't seen: {}",
                    parsed.text
                );
                Ok(())
            }
            RoutingDecision::PassToChat(text) => {
                let triggered = !parsed.command.is_empty();
                self.chat.handle(msg, &text, triggered).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::UNSUPPORTED_TEXT;
    use crate::platform::MessageEntity;
    use crate::testing::*;

    fn router(log: &CallLog, authorized: bool) -> MessageRouter {
        MessageRouter::new(
            identity(),
            settings(),
            Arc::new(FakeAuthorizer(authorized)),
            Arc::new(FakeTransport { log: log.clone() }),
            Arc::new(FakeBackend::new(log.clone())),
        )
    }

    fn chat_cmd(triggers: &[&str]) -> Vec<String> {
        triggers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_parse_without_entities() {
        for text in ["hello there", "", "  /looks like a command"] {
            let parsed = parse(&message(text), &identity());
            assert_eq!(parsed.command, "");
            assert_eq!(parsed.text, text);
            assert!(!parsed.is_mentioned);
        }
    }

    #[test]
    fn test_parse_empty_entity_list() {
        let mut msg = message("/cgpt_help");
        msg.entities = Some(Vec::new());
        assert_eq!(parse(&msg, &identity()).command, "");
    }

    #[test]
    fn test_parse_command_with_body() {
        let parsed = parse(&command_message("/cgpt_reset   and more  ", 11), &identity());
        assert_eq!(parsed.command, "/cgpt_reset");
        assert_eq!(parsed.text, "and more");
        assert!(!parsed.is_mentioned);
    }

    #[test]
    fn test_parse_strips_mention() {
        let text = "/cgpt_help@relay_bot";
        let parsed = parse(&command_message(text, text.len()), &identity());
        assert_eq!(parsed.command, "/cgpt_help");
        assert_eq!(parsed.text, "");
        assert!(parsed.is_mentioned);
    }

    #[test]
    fn test_parse_keeps_foreign_mention() {
        let text = "/cgpt_help@other_bot";
        let parsed = parse(&command_message(text, text.len()), &identity());
        assert_eq!(parsed.command, "/cgpt_help@other_bot");
        assert!(!parsed.is_mentioned);
    }

    #[test]
    fn test_parse_ignores_command_not_at_start() {
        let mut msg = message("hey /cgpt_help");
        msg.entities = Some(vec![MessageEntity {
            kind: EntityKind::BotCommand,
            offset: 4,
            length: 10,
        }]);
        let parsed = parse(&msg, &identity());
        assert_eq!(parsed.command, "");
        assert_eq!(parsed.text, "hey /cgpt_help");
    }

    #[test]
    fn test_parse_uses_first_qualifying_entity() {
        let mut msg = message("/chat /cgpt_help");
        msg.entities = Some(vec![
            MessageEntity {
                kind: EntityKind::Mention,
                offset: 0,
                length: 3,
            },
            MessageEntity {
                kind: EntityKind::BotCommand,
                offset: 0,
                length: 5,
            },
            MessageEntity {
                kind: EntityKind::BotCommand,
                offset: 0,
                length: 16,
            },
        ]);
        let parsed = parse(&msg, &identity());
        assert_eq!(parsed.command, "/chat");
        assert_eq!(parsed.text, "/cgpt_help");
    }

    #[test]
    fn test_parse_body_after_emoji_offsets() {
        // Entity lengths count UTF-16 units; the body keeps its emoji intact
        let parsed = parse(&command_message("/chat 😀 hi", 5), &identity());
        assert_eq!(parsed.command, "/chat");
        assert_eq!(parsed.text, "😀 hi");
    }

    #[test]
    fn test_parse_overlong_entity_clamped() {
        let parsed = parse(&command_message("/chat", 50), &identity());
        assert_eq!(parsed.command, "/chat");
        assert_eq!(parsed.text, "");
    }

    #[test]
    fn test_utf16_to_byte_index() {
        assert_eq!(utf16_to_byte_index("abc", 2), 2);
        assert_eq!(utf16_to_byte_index("😀a", 2), 4);
        // Inside a surrogate pair: move to the next char
        assert_eq!(utf16_to_byte_index("😀a", 1), 4);
        assert_eq!(utf16_to_byte_index("é/", 1), 2);
    }

    #[test]
    fn test_route_plain_text_to_chat() {
        let parsed = ParsedMessage {
            text: "hello".to_string(),
            ..Default::default()
        };
        assert_eq!(
            route(&parsed, &chat_cmd(&["."])),
            RoutingDecision::PassToChat("hello".to_string())
        );
    }

    #[test]
    fn test_route_unknown_command_dispatched() {
        let parsed = ParsedMessage {
            command: "/unknown".to_string(),
            ..Default::default()
        };
        assert_eq!(
            route(&parsed, &chat_cmd(&["."])),
            RoutingDecision::DispatchCommand {
                command: "/unknown".to_string(),
                is_mentioned: false
            }
        );
    }

    #[test]
    fn test_route_command_like_text_ignored() {
        let parsed = ParsedMessage {
            text: "  /broken".to_string(),
            ..Default::default()
        };
        assert_eq!(
            route(&parsed, &chat_cmd(&["."])),
            RoutingDecision::IgnoreCommandLike
        );
    }

    #[test]
    fn test_route_chat_trigger_command_to_chat() {
        let parsed = ParsedMessage {
            text: "/not a command".to_string(),
            command: "/chat".to_string(),
            is_mentioned: true,
        };
        assert_eq!(
            route(&parsed, &chat_cmd(&["/chat"])),
            RoutingDecision::PassToChat("/not a command".to_string())
        );
    }

    #[tokio::test]
    async fn test_unauthorized_message_dropped() {
        let log = CallLog::default();
        router(&log, false)
            .handle(&command_message("/cgpt_help", 10))
            .await
            .unwrap();
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_command_reaches_dispatcher() {
        let log = CallLog::default();
        let text = "/siri_reset@relay_bot";
        router(&log, true)
            .handle(&in_group(command_message(text, text.len())))
            .await
            .unwrap();
        assert_eq!(log.count(&Call::ResetThread), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_reports_unsupported() {
        let log = CallLog::default();
        router(&log, true)
            .handle(&command_message("/start", 6))
            .await
            .unwrap();
        assert_eq!(log.sent_texts(), vec![UNSUPPORTED_TEXT.to_string()]);
    }

    #[tokio::test]
    async fn test_unparsed_command_text_ignored() {
        let log = CallLog::default();
        router(&log, true)
            .handle(&message(" /cgpt_reset"))
            .await
            .unwrap();
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chat_command_reaches_backend() {
        let log = CallLog::default();
        router(&log, true)
            .handle(&in_group(command_message("/chat@relay_bot who are you", 15)))
            .await
            .unwrap();
        assert_eq!(log.count(&Call::Prompt("who are you".to_string())), 1);
        assert_eq!(log.sent_texts(), vec!["pong".to_string()]);
    }
}
