use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

use super::dialogue::MyDialogue;
use super::{reply_html, AdminCommand, Command, HandlerResult};
use crate::db::UserDayStats;
use crate::report::format_report;
use crate::tasks::format_release_note;
use crate::AppContext;

const START_TEXT: &str = "Hi! I keep an eye on group activity: daily reports, \
member rankings, newcomer verification and a punishment ladder for moderators.\n\
Add me to a group as an admin and send /help there.";

pub fn help_text() -> String {
    format!(
        "{}\n\n{}",
        Command::descriptions(),
        AdminCommand::descriptions()
    )
}

pub fn format_me(name: &str, stats: &UserDayStats, level: u32, ladder_len: usize) -> String {
    format!(
        "📈 <b>{}</b> today\n💬 Messages: {}\n❤️ Reactions received: {}\n↩️ Replies received: {}\n⚖️ Punishment level: {}/{}",
        html::escape(name),
        stats.messages,
        stats.reactions_received,
        stats.replies_received,
        level,
        ladder_len
    )
}

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: MyDialogue,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let in_group = !msg.chat.is_private() && !msg.chat.is_channel();

    match cmd {
        Command::Start => {
            reply_html(&bot, &msg, html::escape(START_TEXT)).await?;
        }
        Command::Help => {
            bot.send_message(chat_id, help_text()).await?;
        }
        Command::Me => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            if !in_group {
                reply_html(&bot, &msg, "Ask me this in a group.").await?;
                return Ok(());
            }
            let stats = ctx.db.user_stats(chat_id, user.id, ctx.today()).await?;
            let level = ctx.punishments.level(chat_id, user.id).await?;
            let text = format_me(
                &user.full_name(),
                &stats,
                level,
                ctx.punishments.ladder().len(),
            );
            reply_html(&bot, &msg, text).await?;
        }
        Command::Top => {
            if !in_group {
                reply_html(&bot, &msg, "Ask me this in a group.").await?;
                return Ok(());
            }
            let stats = ctx
                .db
                .day_stats(chat_id, ctx.today(), ctx.settings.report_top_n)
                .await?;
            let title = msg.chat.title().unwrap_or_default();
            bot.send_message(chat_id, format_report(title, &stats))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Command::ReleaseNotes => {
            let text = match ctx.db.latest_release_note().await? {
                Some(note) => format_release_note(&note.version, &note.text),
                None => "No release notes yet.".to_string(),
            };
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Command::Cancel => {
            let state = dialogue.get_or_default().await?;
            let from = msg.from.as_ref().map(|u| u.id);
            if state.author().is_some() && state.author() == from {
                dialogue.exit().await?;
                reply_html(&bot, &msg, "Cancelled.").await?;
            } else {
                reply_html(&bot, &msg, "Nothing to cancel.").await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_lists_both_command_sets() {
        let help = help_text();
        assert!(help.contains("/me"));
        assert!(help.contains("/releasenotes"));
        assert!(help.contains("/mute"));
        assert!(help.contains("/newtemplate"));
    }

    #[test]
    fn test_format_me() {
        let stats = UserDayStats {
            messages: 12,
            reactions_received: 3,
            replies_received: 0,
        };
        let text = format_me("Ada <3", &stats, 1, 5);
        assert!(text.starts_with("📈 <b>Ada &lt;3</b> today"));
        assert!(text.contains("💬 Messages: 12"));
        assert!(text.contains("⚖️ Punishment level: 1/5"));
    }
}
