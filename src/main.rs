use dotenvy::dotenv;
use std::sync::Arc;
use tokio::time::interval;

use faltas::core::{config, init_logger, AppResult, Config};
use faltas::dispatch::{ConversationStore, Dispatcher};
use faltas::storage::{ensure_schema, PgGateway, PgRepository};
use faltas::telegram::{create_bot, run, setup_bot_commands, HandlerDeps};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (configuration, logging,
/// database connection, schema bootstrap).
#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    // Missing credentials are fatal here, before anything else starts
    let config = Config::from_env()?;

    init_logger(&config.log_level, config::LOG_FILE_PATH)?;

    let gateway = Arc::new(PgGateway::new(config.pg.url()));
    gateway.connect().await?;
    ensure_schema(&gateway, config.class_scope).await?;

    let repo = Arc::new(PgRepository::new(Arc::clone(&gateway), config.class_scope));
    let dispatcher = Arc::new(Dispatcher::new(repo, ConversationStore::new()));

    // Periodic sweep keeps the conversation table and the per-chat lock map
    // from growing without bound as chats come and go
    let sweeper = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        let mut ticker = interval(config::conversation::sweep_interval());
        loop {
            ticker.tick().await;
            let expired = sweeper.conversations().expire_idle(config::conversation::idle_timeout());
            if expired > 0 {
                log::info!("Expired {} idle conversation(s)", expired);
            }
            let pruned = sweeper.prune_chat_locks();
            if pruned > 0 {
                log::debug!("Pruned {} idle chat lock(s)", pruned);
            }
        }
    });

    let bot = create_bot(&config);
    setup_bot_commands(&bot).await?;

    run(bot, HandlerDeps { dispatcher }).await;

    log::info!("Bot is shutting down. Closing database connection.");
    gateway.close().await;

    Ok(())
}
