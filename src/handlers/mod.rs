//! Telegram front-end: the dispatcher tree and the handlers it routes to.

pub mod admin;
pub mod callbacks;
pub mod commands;
pub mod dialogue;
pub mod handle_message;
pub mod user;

pub use commands::{AdminCommand, Command};
pub use dialogue::{MyDialogue, State};

use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::sugar::request::RequestReplyExt;
use teloxide::types::{BotCommandScope, Chat, ChatMemberStatus, ParseMode, UserId};
use teloxide::utils::command::BotCommands;

use crate::AppContext;

pub type HandlerResult = Result<()>;

/// Whether a user is the owner or an administrator of a group.
pub async fn is_user_admin(bot: &Bot, chat: &Chat, user_id: UserId) -> Result<bool> {
    if chat.is_private() {
        return Ok(false);
    }
    let member = bot.get_chat_member(chat.id, user_id).await?;
    Ok(matches!(
        member.status(),
        ChatMemberStatus::Owner | ChatMemberStatus::Administrator
    ))
}

/// Whether the message was sent by a group admin, including anonymous admins
/// posting as the group itself.
pub async fn sent_by_admin(bot: &Bot, msg: &Message) -> Result<bool> {
    if msg.sender_chat.as_ref().map(|c| c.id) == Some(msg.chat.id) {
        return Ok(true);
    }
    match msg.from.as_ref() {
        Some(user) => is_user_admin(bot, &msg.chat, user.id).await,
        None => Ok(false),
    }
}

/// Reply to a message with HTML text.
pub async fn reply_html(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<Message> {
    Ok(bot
        .send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_to(msg.id)
        .await?)
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    let dialogue_branch = dptree::filter(|msg: Message, state: State| {
        let from = msg.from.as_ref().map(|u| u.id);
        let is_command = msg.text().map(|t| t.starts_with('/')).unwrap_or(false);
        state.author().is_some() && state.author() == from && !is_command
    })
    .endpoint(dialogue::handle_dialogue);

    let message_handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(dialogue_branch)
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(user::handle_command),
        )
        .branch(
            dptree::entry()
                .filter_command::<AdminCommand>()
                .endpoint(admin::handle_admin_command),
        )
        .branch(dptree::endpoint(handle_message::handle_message));

    dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_callback_query().endpoint(callbacks::handle_callback))
        .branch(
            Update::filter_message_reaction_updated().endpoint(handle_message::handle_reaction),
        )
        .branch(Update::filter_my_chat_member().endpoint(handle_message::handle_my_chat_member))
}

/// Register both command lists with Telegram.
pub async fn setup_bot_commands(bot: &Bot) -> Result<()> {
    let mut all_commands = Command::bot_commands();
    all_commands.extend(AdminCommand::bot_commands());
    bot.set_my_commands(all_commands)
        .scope(BotCommandScope::Default)
        .await?;
    Ok(())
}

pub async fn run_dispatcher(bot: Bot, ctx: Arc<AppContext>) {
    log::info!("Dispatching updates...");
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![ctx, InMemStorage::<State>::new()])
        .default_handler(|update| async move {
            log::trace!("Unhandled update {:?}", update.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    log::info!("Dispatcher stopped");
}
