//! Newcomer verification: mute on join, unmute on button press, kick on timeout.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Chat, ChatId, ChatPermissions, ParseMode, User, UserId};
use teloxide::utils::html;

use crate::config::ANTIBOT_SWEEP_INTERVAL;
use crate::db::Verification;
use crate::keyboards::verify_keyboard;
use crate::AppContext;

/// Clickable HTML mention of a user.
pub fn mention(user_id: UserId, name: &str) -> String {
    format!("<a href=\"tg://user?id={}\">{}</a>", user_id.0, html::escape(name))
}

pub fn challenge_text(user: &User, timeout_secs: u64) -> String {
    format!(
        "👋 {}, please press the button below within {} seconds to show you are not a bot.",
        mention(user.id, &user.full_name()),
        timeout_secs
    )
}

/// Handle members that just joined. Bots are left alone.
pub async fn handle_new_members(
    bot: &Bot,
    ctx: &AppContext,
    chat: &Chat,
    members: &[User],
    now: DateTime<Utc>,
) -> Result<()> {
    let settings = ctx.db.get_settings(chat.id).await?;

    for user in members.iter().filter(|u| !u.is_bot) {
        if !settings.antibot {
            if let Some(welcome) = &settings.welcome {
                if let Err(e) = send_welcome(bot, ctx, chat, user, welcome).await {
                    log::warn!("Could not welcome user {} in chat {}: {}", user.id, chat.id, e);
                }
            }
            continue;
        }

        if let Err(e) = bot
            .restrict_chat_member(chat.id, user.id, ChatPermissions::empty())
            .await
        {
            // Without restrict rights a challenge is pointless.
            log::warn!("Cannot restrict user {} in chat {}: {}", user.id, chat.id, e);
            continue;
        }

        // A restriction without a pending challenge would never be lifted.
        if let Err(e) = challenge(bot, ctx, chat, user, now).await {
            log::error!("Could not challenge user {} in chat {}: {}", user.id, chat.id, e);
            if let Err(e) = bot
                .restrict_chat_member(chat.id, user.id, ChatPermissions::all())
                .await
            {
                log::error!("Could not lift restriction of user {} in chat {}: {}", user.id, chat.id, e);
            }
        }
    }
    Ok(())
}

/// Send the verification button and store the pending record.
async fn challenge(
    bot: &Bot,
    ctx: &AppContext,
    chat: &Chat,
    user: &User,
    now: DateTime<Utc>,
) -> Result<()> {
    let timeout = ctx.settings.antibot_timeout;
    let deadline = now + chrono::Duration::from_std(timeout)?;
    let message = bot
        .send_message(chat.id, challenge_text(user, timeout.as_secs()))
        .parse_mode(ParseMode::Html)
        .reply_markup(verify_keyboard(user.id))
        .await?;

    let verification = Verification {
        chat_id: chat.id.0,
        user_id: user.id.0,
        message_id: message.id.0,
        deadline,
    };
    if let Err(e) = ctx.db.add_verification(&verification).await {
        if let Err(e) = bot.delete_message(chat.id, message.id).await {
            log::warn!("Could not delete challenge in chat {}: {}", chat.id, e);
        }
        return Err(e);
    }
    log::info!("User {} must verify in chat {} before {}", user.id, chat.id, deadline);
    Ok(())
}

async fn send_welcome(
    bot: &Bot,
    ctx: &AppContext,
    chat: &Chat,
    user: &User,
    template: &str,
) -> Result<()> {
    match ctx.db.get_template(template).await? {
        Some(template) => {
            let title = chat.title().unwrap_or_default();
            let text = template.render(&mention(user.id, &user.full_name()), &html::escape(title));
            bot.send_message(chat.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        None => log::warn!("Welcome template {} of chat {} is missing", template, chat.id),
    }
    Ok(())
}

/// Outcome of a press on a verification button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    Verified,
    /// Someone other than the newcomer pressed it.
    NotForYou,
    /// Nothing pending: already verified or already timed out.
    Stale,
}

/// Handle a press on the button bound to `target`.
pub async fn handle_verify_press(
    bot: &Bot,
    ctx: &AppContext,
    chat: &Chat,
    presser: &User,
    target: UserId,
) -> Result<PressOutcome> {
    if presser.id != target {
        return Ok(PressOutcome::NotForYou);
    }
    // Past the deadline the sweeper owns the record.
    let verification = match ctx.db.get_verification(chat.id, target).await? {
        Some(v) if !v.is_expired(Utc::now()) => v,
        _ => return Ok(PressOutcome::Stale),
    };
    if !ctx.db.remove_verification(chat.id, target).await? {
        return Ok(PressOutcome::Stale);
    }

    if let Err(e) = bot
        .restrict_chat_member(chat.id, target, ChatPermissions::all())
        .await
    {
        // Put the record back so the user can press again or the sweeper settles it.
        ctx.db.add_verification(&verification).await?;
        return Err(e.into());
    }
    if let Err(e) = bot.delete_message(chat.id, verification.message()).await {
        log::warn!("Could not delete challenge in chat {}: {}", chat.id, e);
    }
    log::info!("User {} verified in chat {}", target, chat.id);

    if let Some(welcome) = ctx.db.get_settings(chat.id).await?.welcome {
        if let Err(e) = send_welcome(bot, ctx, chat, presser, &welcome).await {
            log::warn!("Could not welcome user {} in chat {}: {}", target, chat.id, e);
        }
    }
    Ok(PressOutcome::Verified)
}

/// Kick everyone whose deadline passed. Returns how many were kicked.
pub async fn sweep_expired(bot: &Bot, ctx: &AppContext, now: DateTime<Utc>) -> Result<usize> {
    let mut kicked = 0;
    for verification in ctx.db.expired_verifications(now).await? {
        let chat_id: ChatId = verification.chat();
        let user_id = verification.user();
        if !ctx.db.remove_verification(chat_id, user_id).await? {
            continue;
        }

        // Ban then unban so the user is removed but may come back.
        match bot.ban_chat_member(chat_id, user_id).await {
            Ok(_) => {
                if let Err(e) = bot.unban_chat_member(chat_id, user_id).await {
                    log::warn!("Could not unban user {} in chat {}: {}", user_id, chat_id, e);
                }
                kicked += 1;
                log::info!("User {} failed verification in chat {}", user_id, chat_id);
            }
            Err(e) => {
                log::warn!("Could not kick user {} from chat {}: {}", user_id, chat_id, e);
                if let Err(e) = bot
                    .restrict_chat_member(chat_id, user_id, ChatPermissions::all())
                    .await
                {
                    log::error!("Could not lift restriction of user {} in chat {}: {}", user_id, chat_id, e);
                }
            }
        }
        if let Err(e) = bot.delete_message(chat_id, verification.message()).await {
            log::warn!("Could not delete challenge in chat {}: {}", chat_id, e);
        }
    }
    Ok(kicked)
}

pub async fn run_sweeper(bot: Bot, ctx: Arc<AppContext>) {
    loop {
        if let Err(e) = sweep_expired(&bot, &ctx, Utc::now()).await {
            log::error!("Error sweeping expired verifications: {}", e);
        }
        tokio::time::sleep(ANTIBOT_SWEEP_INTERVAL).await;
    }
}
