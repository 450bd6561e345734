mod auth;
mod chat;
mod commands;
mod config;
mod llm;
mod platform;
mod router;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{Authorizer, ConfigAuthenticator};
use crate::config::Config;
use crate::llm::{ChatBackend, LlmClient};
use crate::platform::telegram::{self, TelegramTransport};
use crate::platform::Transport;
use crate::router::MessageRouter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cgpt_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.model);
    info!("  Chat triggers: {:?}", config.telegram.chat_cmd);
    info!("  Admin users: {:?}", config.telegram.user_ids);
    info!("  Allowed groups: {:?}", config.telegram.group_ids);

    let bot = Bot::new(&config.telegram.bot_token);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));

    // The bot identity is fetched once, before any message is handled
    let identity = transport.get_me().await?;

    if let Err(e) = telegram::register_commands(&bot).await {
        warn!("Could not register command menu: {:#}", e);
    }

    let settings = Arc::new(config.telegram.clone());
    let backend: Arc<dyn ChatBackend> = Arc::new(LlmClient::new(config.llm.clone())?);
    let authorizer: Arc<dyn Authorizer> =
        Arc::new(ConfigAuthenticator::new(transport.clone(), settings.clone()));

    let router = Arc::new(MessageRouter::new(
        identity,
        settings,
        authorizer,
        transport,
        backend,
    ));

    info!("Bot @{} has started...", router.identity().username);
    telegram::run(bot, router).await?;

    Ok(())
}
