use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;

use super::admin::history_text;
use super::{is_user_admin, HandlerResult};
use crate::antibot::{self, mention, PressOutcome};
use crate::keyboards::{history_keyboard, CallbackData};
use crate::AppContext;

/// Answer text for a verification press, and whether it pops up as an alert.
fn press_answer(outcome: PressOutcome) -> (&'static str, bool) {
    match outcome {
        PressOutcome::Verified => ("Welcome!", false),
        PressOutcome::NotForYou => ("This button is not for you.", true),
        PressOutcome::Stale => ("Nothing to verify.", false),
    }
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, ctx: Arc<AppContext>) -> HandlerResult {
    let data = q.data.as_deref().and_then(|d| d.parse::<CallbackData>().ok());
    let (Some(data), Some(message)) = (data, q.regular_message()) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let chat = &message.chat;

    match data {
        CallbackData::Verify(target) => {
            let outcome = antibot::handle_verify_press(&bot, &ctx, chat, &q.from, target).await?;
            let (text, alert) = press_answer(outcome);
            bot.answer_callback_query(q.id.clone())
                .text(text)
                .show_alert(alert)
                .await?;
        }
        CallbackData::Template(name) => {
            if !is_user_admin(&bot, chat, q.from.id).await? {
                bot.answer_callback_query(q.id.clone())
                    .text("Only admins can send templates.")
                    .await?;
                return Ok(());
            }
            match ctx.db.get_template(&name).await? {
                Some(template) => {
                    let title = html::escape(chat.title().unwrap_or_default());
                    let user = mention(q.from.id, &q.from.full_name());
                    bot.send_message(chat.id, template.render(&user, &title))
                        .parse_mode(ParseMode::Html)
                        .await?;
                    bot.answer_callback_query(q.id.clone()).await?;
                }
                None => {
                    bot.answer_callback_query(q.id.clone())
                        .text("This template no longer exists.")
                        .await?;
                }
            }
        }
        CallbackData::History(target) => {
            if !is_user_admin(&bot, chat, q.from.id).await? {
                bot.answer_callback_query(q.id.clone())
                    .text("Only admins can see punishment history.")
                    .await?;
                return Ok(());
            }
            let text = history_text(&ctx, chat.id, target).await?;
            // Telegram rejects edits that change nothing.
            if let Err(e) = bot
                .edit_message_text(chat.id, message.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(history_keyboard(target))
                .await
            {
                log::debug!("History not refreshed in chat {}: {}", chat.id, e);
            }
            bot.answer_callback_query(q.id.clone()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_foreign_presses_alert() {
        assert_eq!(press_answer(PressOutcome::NotForYou), ("This button is not for you.", true));
        assert!(!press_answer(PressOutcome::Verified).1);
        assert!(!press_answer(PressOutcome::Stale).1);
    }
}
