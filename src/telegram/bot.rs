//! Telegram transport adapter
//!
//! Turns dispatcher output into actual message-send/edit calls and owns the
//! event loop. The handler tree is built by [`schema`] so integration tests
//! could drive the same tree as production.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};

use crate::core::Config;
use crate::dispatch::{ChatInfo, RenderMode, Response};
use crate::storage::PgRepository;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies injected into the handler tree
#[derive(Clone)]
pub struct HandlerDeps {
    pub dispatcher: Arc<crate::dispatch::Dispatcher<PgRepository>>,
}

/// Creates the Bot instance from the configured credential token.
pub fn create_bot(config: &Config) -> Bot {
    Bot::new(config.bot_token.clone())
}

/// Registers the command list shown in the Telegram UI.
///
/// # Errors
/// Returns `RequestError` if the API call fails.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "Start the bot"),
        BotCommand::new("register_class", "Register a new class"),
        BotCommand::new("add_absence", "Record an absence"),
        BotCommand::new("remove_absence", "Remove an absence"),
        BotCommand::new("my_absences", "Absences for one class"),
        BotCommand::new("total_absences", "Total absences"),
        BotCommand::new("list_classes", "List registered classes"),
        BotCommand::new("menu", "Show the options overview"),
        BotCommand::new("help", "Help on the available commands"),
        BotCommand::new("cancel", "Abort an ongoing registration"),
    ])
    .await?;

    Ok(())
}

/// Builds the handler tree: text messages and selection callbacks.
pub fn schema() -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler))
}

/// Runs the event loop until shutdown (Ctrl-C).
pub async fn run(bot: Bot, deps: HandlerDeps) {
    log::info!("Bot is starting...");
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn message_handler(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat = ChatInfo {
        chat_id: msg.chat.id.0.to_string(),
        username: msg.from.as_ref().and_then(|u| u.username.clone()),
        first_name: msg.from.as_ref().map(|u| u.first_name.clone()),
    };

    let response = deps.dispatcher.handle_text(&chat, text).await;
    render(&bot, msg.chat.id, None, response).await?;
    Ok(())
}

async fn callback_handler(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> Result<(), HandlerError> {
    // Stop the client-side loading spinner regardless of what happens next
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data else {
        return Ok(());
    };
    let (Some(chat_id), Some(message_id)) = (
        q.message.as_ref().map(|m| m.chat().id),
        q.message.as_ref().map(|m| m.id()),
    ) else {
        return Ok(());
    };

    let response = deps
        .dispatcher
        .handle_callback(&chat_id.0.to_string(), &data)
        .await;
    render(&bot, chat_id, Some(message_id), response).await?;
    Ok(())
}

/// Renders a response descriptor as a send or edit call, with choices as an
/// inline keyboard.
async fn render(
    bot: &Bot,
    chat_id: ChatId,
    message_id: Option<MessageId>,
    response: Response,
) -> Result<(), teloxide::RequestError> {
    let keyboard = response.choices.map(|choices| {
        InlineKeyboardMarkup::new(
            choices
                .into_iter()
                .map(|choice| vec![InlineKeyboardButton::callback(choice.label, choice.data)]),
        )
    });

    match (response.mode, message_id) {
        (RenderMode::Edit, Some(message_id)) => {
            let request = bot.edit_message_text(chat_id, message_id, response.text);
            match keyboard {
                Some(keyboard) => request.reply_markup(keyboard).await?,
                None => request.await?,
            };
        }
        _ => {
            let request = bot.send_message(chat_id, response.text);
            match keyboard {
                Some(keyboard) => request.reply_markup(keyboard).await?,
                None => request.await?,
            };
        }
    }
    Ok(())
}
