use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::sugar::request::RequestReplyExt;
use teloxide::types::{Chat, ChatId, ParseMode, UserId};
use teloxide::utils::html;

use super::dialogue::{MyDialogue, State};
use super::{is_user_admin, reply_html, sent_by_admin, AdminCommand, HandlerResult};
use crate::antibot::mention;
use crate::db::templates::normalize_template_name;
use crate::db::PunishmentRecord;
use crate::keyboards::{history_keyboard, templates_keyboard};
use crate::punishment::{enforce, parse_duration, Applied, Ladder, PunishmentKind};
use crate::report::format_report;
use crate::AppContext;

const HISTORY_LIMIT: usize = 10;
const FALLBACK_MUTE: Duration = Duration::from_secs(60 * 60);

/// Member an admin command is aimed at.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: UserId,
    pub name: String,
}

/// Split off the first whitespace-separated word.
pub fn split_first_word(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (args, ""),
    }
}

/// `on`/`off` style arguments.
pub fn parse_switch(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "yes" | "1" | "enable" => Some(true),
        "off" | "no" | "0" | "disable" => Some(false),
        _ => None,
    }
}

/// Length used by `/mute` without a duration: the first mute on the ladder.
pub fn default_mute(ladder: &Ladder) -> Duration {
    ladder
        .steps()
        .iter()
        .find_map(|step| match step {
            PunishmentKind::Mute { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        })
        .unwrap_or(FALLBACK_MUTE)
}

fn icon(kind: &PunishmentKind) -> &'static str {
    match kind {
        PunishmentKind::Warn => "⚠️",
        PunishmentKind::Mute { .. } => "🔇",
        PunishmentKind::Ban => "⛔",
        PunishmentKind::Unmute | PunishmentKind::Unban => "✅",
    }
}

/// Chat announcement of an action. `who` is already HTML.
pub fn format_action(who: &str, applied: &Applied, ladder_len: usize) -> String {
    let kind = &applied.record.kind;
    let mut text = if kind.is_punishment() {
        format!(
            "{} {}: {} (level {}/{})",
            icon(kind),
            who,
            kind,
            applied.level,
            ladder_len
        )
    } else {
        format!("{} {}: {}", icon(kind), who, kind)
    };
    if let Some(reason) = &applied.record.reason {
        text.push_str(&format!("\nReason: {}", html::escape(reason)));
    }
    text
}

/// HTML listing of the most recent actions against a member.
pub fn format_history(
    name: &str,
    level: u32,
    ladder_len: usize,
    records: &[PunishmentRecord],
) -> String {
    let mut lines = vec![format!(
        "📜 <b>History of {}</b> (level {}/{})",
        html::escape(name),
        level,
        ladder_len
    )];
    if records.is_empty() {
        lines.push("No punishments.".to_string());
    }
    for record in records {
        let mut line = format!(
            "• {} · {}",
            record.issued_at.format("%Y-%m-%d %H:%M"),
            record.kind
        );
        if let Some(reason) = &record.reason {
            line.push_str(&format!(" · {}", html::escape(reason)));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Find the member a moderation command targets: the author of the replied
/// message, or an `@username` as first argument. Returns the target and the
/// remaining arguments.
async fn resolve_target(
    ctx: &AppContext,
    msg: &Message,
    args: &str,
) -> anyhow::Result<Option<(Target, String)>> {
    if let Some(user) = msg.reply_to_message().and_then(|m| m.from.as_ref()) {
        let target = Target {
            id: user.id,
            name: user.full_name(),
        };
        return Ok(Some((target, args.trim().to_string())));
    }
    let (first, rest) = split_first_word(args);
    let Some(username) = first.strip_prefix('@') else {
        return Ok(None);
    };
    Ok(ctx
        .db
        .find_user_by_username(username)
        .await?
        .map(|record| {
            let target = Target {
                id: UserId(record.id),
                name: record.display_name(),
            };
            (target, rest.to_string())
        }))
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Next,
    Warn,
    Mute,
    Ban,
    Unmute,
    Unban,
}

/// Why `target` cannot be punished in `chat`, if it cannot: the bot itself
/// and the chat's admins are off limits.
pub async fn protected(bot: &Bot, chat: &Chat, target: UserId) -> anyhow::Result<Option<&'static str>> {
    if target == bot.get_me().await?.id {
        return Ok(Some("I will not punish myself."));
    }
    if is_user_admin(bot, chat, target).await? {
        return Ok(Some("Admins cannot be punished."));
    }
    Ok(None)
}

async fn moderate(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    action: Action,
    args: &str,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let Some((target, rest)) = resolve_target(ctx, msg, args).await? else {
        reply_html(bot, msg, "Reply to a member's message or name them as @username.").await?;
        return Ok(());
    };

    let (kind, reason) = match action {
        Action::Next => (ctx.punishments.next_step(chat_id, target.id).await?, rest),
        Action::Warn => (PunishmentKind::Warn, rest),
        Action::Mute => {
            let (first, tail) = split_first_word(&rest);
            match parse_duration(first) {
                Ok(Some(duration)) => (PunishmentKind::mute(duration), tail.to_string()),
                Ok(None) => (
                    PunishmentKind::mute(default_mute(ctx.punishments.ladder())),
                    rest.clone(),
                ),
                Err(e) => {
                    reply_html(bot, msg, html::escape(&e.to_string())).await?;
                    return Ok(());
                }
            }
        }
        Action::Ban => (PunishmentKind::Ban, rest),
        Action::Unmute => (PunishmentKind::Unmute, rest),
        Action::Unban => (PunishmentKind::Unban, rest),
    };

    if kind.is_punishment() {
        if let Some(refusal) = protected(bot, &msg.chat, target.id).await? {
            reply_html(bot, msg, refusal).await?;
            return Ok(());
        }
    }

    let now = Utc::now();
    if let Err(e) = enforce(bot, chat_id, target.id, &kind, now).await {
        log::warn!("Could not apply {} to user {} in chat {}: {}", kind, target.id, chat_id, e);
        reply_html(
            bot,
            msg,
            format!(
                "Telegram refused the {}: {}. Check the bot's admin rights.",
                kind,
                html::escape(&e.to_string())
            ),
        )
        .await?;
        return Ok(());
    }

    let issuer = msg.from.as_ref().map(|u| u.id).unwrap_or(UserId(0));
    let reason = Some(reason);
    let applied = match action {
        Action::Next => {
            ctx.punishments
                .escalate(chat_id, target.id, issuer, reason, now, ctx.today())
                .await?
        }
        _ => {
            ctx.punishments
                .punish(chat_id, target.id, kind, issuer, reason, now, ctx.today())
                .await?
        }
    };
    log::info!(
        "User {} got {} in chat {} from {} (level {})",
        target.id, kind, chat_id, issuer, applied.level
    );
    reply_html(
        bot,
        msg,
        format_action(
            &mention(target.id, &target.name),
            &applied,
            ctx.punishments.ladder().len(),
        ),
    )
    .await?;
    Ok(())
}

/// History text for the refresh button as well as `/history`.
pub async fn history_text(ctx: &AppContext, chat_id: ChatId, user_id: UserId) -> anyhow::Result<String> {
    let name = ctx.db.display_name(user_id).await?;
    let level = ctx.punishments.level(chat_id, user_id).await?;
    let records = ctx.db.history(chat_id, user_id, HISTORY_LIMIT).await?;
    Ok(format_history(&name, level, ctx.punishments.ladder().len(), &records))
}

async fn switch_setting(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    label: &str,
    arg: &str,
    current: bool,
    reports: bool,
) -> HandlerResult {
    let state = |on: bool| if on { "on" } else { "off" };
    if arg.trim().is_empty() {
        reply_html(bot, msg, format!("{} is {}.", label, state(current))).await?;
        return Ok(());
    }
    let Some(enabled) = parse_switch(arg) else {
        reply_html(bot, msg, "Use on or off.").await?;
        return Ok(());
    };
    if reports {
        ctx.db.set_reports(msg.chat.id, enabled).await?;
    } else {
        ctx.db.set_antibot(msg.chat.id, enabled).await?;
    }
    log::info!("{} turned {} in chat {}", label, state(enabled), msg.chat.id);
    reply_html(bot, msg, format!("{} is now {}.", label, state(enabled))).await?;
    Ok(())
}

async fn start_release(bot: &Bot, msg: &Message, dialogue: MyDialogue, ctx: &AppContext) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !ctx.settings.is_superadmin(user.id) {
        reply_html(bot, msg, "Only bot operators can publish release notes.").await?;
        return Ok(());
    }
    if !msg.chat.is_private() {
        reply_html(bot, msg, "Send me this command in a private chat.").await?;
        return Ok(());
    }
    dialogue.update(State::ReleaseVersion { author: user.id }).await?;
    reply_html(bot, msg, "Send the version of the release, or /cancel.").await?;
    Ok(())
}

pub async fn handle_admin_command(
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
    dialogue: MyDialogue,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    if cmd == AdminCommand::NewRelease {
        return start_release(&bot, &msg, dialogue, &ctx).await;
    }
    if msg.chat.is_private() || msg.chat.is_channel() {
        reply_html(&bot, &msg, "This command only works in groups.").await?;
        return Ok(());
    }
    if !sent_by_admin(&bot, &msg).await? {
        reply_html(&bot, &msg, "Only admins can use this command.").await?;
        return Ok(());
    }
    ctx.db.upsert_chat(&msg.chat).await?;
    let chat_id = msg.chat.id;

    match cmd {
        AdminCommand::Warn(args) => moderate(&bot, &msg, &ctx, Action::Warn, &args).await?,
        AdminCommand::Punish(args) => moderate(&bot, &msg, &ctx, Action::Next, &args).await?,
        AdminCommand::Mute(args) => moderate(&bot, &msg, &ctx, Action::Mute, &args).await?,
        AdminCommand::Unmute(args) => moderate(&bot, &msg, &ctx, Action::Unmute, &args).await?,
        AdminCommand::Ban(args) => moderate(&bot, &msg, &ctx, Action::Ban, &args).await?,
        AdminCommand::Unban(args) => moderate(&bot, &msg, &ctx, Action::Unban, &args).await?,
        AdminCommand::Amnesty(args) => match resolve_target(&ctx, &msg, &args).await? {
            Some((target, _)) => {
                ctx.punishments.amnesty(chat_id, target.id).await?;
                log::info!("Amnesty for user {} in chat {}", target.id, chat_id);
                reply_html(
                    &bot,
                    &msg,
                    format!("🕊 {} starts from a clean slate.", mention(target.id, &target.name)),
                )
                .await?;
            }
            None => {
                reply_html(&bot, &msg, "Reply to a member's message or name them as @username.")
                    .await?;
            }
        },
        AdminCommand::History(args) => match resolve_target(&ctx, &msg, &args).await? {
            Some((target, _)) => {
                let text = history_text(&ctx, chat_id, target.id).await?;
                bot.send_message(chat_id, text)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(history_keyboard(target.id))
                    .await?;
            }
            None => {
                reply_html(&bot, &msg, "Reply to a member's message or name them as @username.")
                    .await?;
            }
        },
        AdminCommand::Antibot(arg) => {
            let current = ctx.db.get_settings(chat_id).await?.antibot;
            switch_setting(&bot, &msg, &ctx, "Newcomer verification", &arg, current, false).await?;
        }
        AdminCommand::Reports(arg) => {
            let current = ctx.db.get_settings(chat_id).await?.reports;
            switch_setting(&bot, &msg, &ctx, "Daily reports", &arg, current, true).await?;
        }
        AdminCommand::Report => {
            let stats = ctx
                .db
                .day_stats(chat_id, ctx.today(), ctx.settings.report_top_n)
                .await?;
            let title = msg.chat.title().unwrap_or_default();
            bot.send_message(chat_id, format_report(title, &stats))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        AdminCommand::Welcome(arg) => {
            let arg = arg.trim();
            if arg.is_empty() {
                let text = match ctx.db.get_settings(chat_id).await?.welcome {
                    Some(name) => format!("Newcomers are greeted with <b>{}</b>.", html::escape(&name)),
                    None => "No welcome message is set.".to_string(),
                };
                reply_html(&bot, &msg, text).await?;
            } else if parse_switch(arg) == Some(false) {
                ctx.db.set_welcome(chat_id, None).await?;
                reply_html(&bot, &msg, "Welcome message turned off.").await?;
            } else {
                match normalize_template_name(arg) {
                    Ok(name) if ctx.db.get_template(&name).await?.is_some() => {
                        ctx.db.set_welcome(chat_id, Some(&name)).await?;
                        reply_html(
                            &bot,
                            &msg,
                            format!("Newcomers will be greeted with <b>{}</b>.", html::escape(&name)),
                        )
                        .await?;
                    }
                    _ => {
                        reply_html(&bot, &msg, "No such template. See /templates.").await?;
                    }
                }
            }
        }
        AdminCommand::Template(arg) => {
            let template = match normalize_template_name(&arg) {
                Ok(name) => ctx.db.get_template(&name).await?,
                Err(_) => None,
            };
            let Some(template) = template else {
                reply_html(&bot, &msg, "No such template. See /templates.").await?;
                return Ok(());
            };
            let replied = msg.reply_to_message();
            let user = replied
                .and_then(|m| m.from.as_ref())
                .or(msg.from.as_ref())
                .map(|u| mention(u.id, &u.full_name()))
                .unwrap_or_default();
            let title = html::escape(msg.chat.title().unwrap_or_default());
            let mut request = bot
                .send_message(chat_id, template.render(&user, &title))
                .parse_mode(ParseMode::Html);
            if let Some(replied) = replied {
                request = request.reply_to(replied.id);
            }
            request.await?;
        }
        AdminCommand::Templates => {
            let templates = ctx.db.list_templates().await?;
            if templates.is_empty() {
                reply_html(&bot, &msg, "No templates yet. Create one with /newtemplate.").await?;
            } else {
                bot.send_message(chat_id, "Templates:")
                    .reply_markup(templates_keyboard(&templates))
                    .await?;
            }
        }
        AdminCommand::NewTemplate => {
            let author = msg.from.as_ref().map(|u| u.id).unwrap_or(UserId(0));
            dialogue.update(State::TemplateName { author }).await?;
            reply_html(&bot, &msg, "Send the template name (a-z, 0-9, _ and -), or /cancel.")
                .await?;
        }
        AdminCommand::DelTemplate(arg) => {
            let deleted = match normalize_template_name(&arg) {
                Ok(name) => ctx.db.delete_template(&name).await?,
                Err(_) => false,
            };
            let text = if deleted { "Template deleted." } else { "No such template." };
            reply_html(&bot, &msg, text).await?;
        }
        AdminCommand::NewRelease => {}
    }
    Ok(())
}
