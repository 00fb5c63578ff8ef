mod bot;
mod broadcast;
mod config;
mod llm;
mod menu;
mod responder;
mod scheduler;
mod tips;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::broadcast::ChatRegistry;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::responder::Responder;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,securityguard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        info!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
    } else {
        warn!(
            "{} not found, using defaults and environment",
            config_path.display()
        );
    }
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.model);
    info!(
        "  Daily broadcast: {} ({})",
        if config.broadcast.enabled { "on" } else { "off" },
        config.broadcast.cron
    );

    let tips = config.tips.clone();
    info!("Loaded {} tips", tips.len());
    let registry = Arc::new(ChatRegistry::new());
    let bot = Bot::new(&config.telegram.bot_token);

    let responder = Responder::new(Arc::new(LlmClient::new(config.llm.clone())));

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_daily_tip(
        &scheduler,
        &config.broadcast,
        Arc::new(bot.clone()),
        Arc::clone(&registry),
        tips.clone(),
    )
    .await?;
    scheduler.start().await?;

    let state = Arc::new(AppState::new(responder, tips, registry));

    // Run the Telegram bot
    info!("Bot is running...");
    bot::run(bot, state).await?;

    scheduler.shutdown().await?;
    Ok(())
}
