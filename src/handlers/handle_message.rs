//! Activity tracking: messages, replies, joins, reactions and the bot's own
//! membership changes.

use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, ChatMemberStatus, ChatMemberUpdated, MessageId, MessageReactionUpdated, UserId,
};

use super::HandlerResult;
use crate::antibot;
use crate::AppContext;

pub async fn handle_message(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> HandlerResult {
    if msg.chat.is_private() || msg.chat.is_channel() {
        return Ok(());
    }
    let now = Utc::now();
    let day = ctx.today();
    ctx.db.upsert_chat(&msg.chat).await?;

    if let Some(members) = msg.new_chat_members() {
        for member in members.iter().filter(|m| !m.is_bot) {
            ctx.db.upsert_user(member, now).await?;
            ctx.db.record_join(msg.chat.id, day).await?;
        }
        antibot::handle_new_members(&bot, &ctx, &msg.chat, members, now).await?;
        return Ok(());
    }

    let Some(author) = msg.from.as_ref() else {
        return Ok(());
    };
    // Service messages and anonymous admins are not member activity.
    if author.is_bot || msg.sender_chat.is_some() {
        return Ok(());
    }

    ctx.db.upsert_user(author, now).await?;
    ctx.db.record_message(msg.chat.id, msg.id, author.id, day).await?;

    if let Some(replied) = msg.reply_to_message() {
        let to = match replied.from.as_ref() {
            Some(user) if !user.is_bot => Some(user.id),
            Some(_) => None,
            None => ctx.db.message_author(msg.chat.id, replied.id).await?,
        };
        if let Some(to) = to {
            ctx.db.record_reply(msg.chat.id, author.id, to, day).await?;
        }
    }
    Ok(())
}

/// A reaction update reduced to what the statistics need.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionChange {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub actor: UserId,
    /// New reaction count minus old reaction count.
    pub delta: i64,
}

impl ReactionChange {
    /// Anonymous reactions (sent on behalf of a chat) yield `None`.
    pub fn from_update(update: &MessageReactionUpdated) -> Option<Self> {
        let actor = update.user()?;
        Some(ReactionChange {
            chat_id: update.chat.id,
            message_id: update.message_id,
            actor: actor.id,
            delta: update.new_reaction.len() as i64 - update.old_reaction.len() as i64,
        })
    }
}

pub async fn handle_reaction(
    reaction: MessageReactionUpdated,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let Some(change) = ReactionChange::from_update(&reaction) else {
        return Ok(());
    };
    let credited = ctx
        .db
        .record_reaction(
            change.chat_id,
            change.message_id,
            change.actor,
            change.delta,
            ctx.today(),
        )
        .await?;
    if let Some(author) = credited {
        log::debug!(
            "Reaction change {} from {} to {} in chat {}",
            change.delta, change.actor, author, change.chat_id
        );
    }
    Ok(())
}

/// Keep the chat index in sync with the groups the bot is in.
pub async fn handle_my_chat_member(
    update: ChatMemberUpdated,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let chat = &update.chat;
    let present = matches!(
        update.new_chat_member.status(),
        ChatMemberStatus::Owner
            | ChatMemberStatus::Administrator
            | ChatMemberStatus::Member
            | ChatMemberStatus::Restricted
    );
    if present {
        log::info!("Bot is now in chat {} ({:?})", chat.id, chat.title());
        ctx.db.upsert_chat(chat).await?;
    } else {
        log::info!("Bot left chat {} ({:?})", chat.id, chat.title());
        ctx.db.mark_left(chat.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(raw: &str) -> MessageReactionUpdated {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_reaction_added() {
        let reaction = update(
            r#"{
                "chat": {"id": -100123, "type": "supergroup", "title": "Rust"},
                "message_id": 77,
                "user": {"id": 42, "is_bot": false, "first_name": "Ada"},
                "date": 1714550400,
                "old_reaction": [],
                "new_reaction": [
                    {"type": "emoji", "emoji": "👍"},
                    {"type": "emoji", "emoji": "🔥"}
                ]
            }"#,
        );
        assert_eq!(
            ReactionChange::from_update(&reaction),
            Some(ReactionChange {
                chat_id: ChatId(-100123),
                message_id: MessageId(77),
                actor: UserId(42),
                delta: 2,
            })
        );
    }

    #[test]
    fn test_reaction_removed() {
        let reaction = update(
            r#"{
                "chat": {"id": -1001, "type": "supergroup", "title": "Rust"},
                "message_id": 5,
                "user": {"id": 9, "is_bot": false, "first_name": "Bob"},
                "date": 1714550400,
                "old_reaction": [{"type": "emoji", "emoji": "👍"}],
                "new_reaction": []
            }"#,
        );
        let change = ReactionChange::from_update(&reaction).unwrap();
        assert_eq!(change.actor, UserId(9));
        assert_eq!(change.delta, -1);
    }

    #[test]
    fn test_anonymous_reaction_is_ignored() {
        let reaction = update(
            r#"{
                "chat": {"id": -1001, "type": "supergroup", "title": "Rust"},
                "message_id": 5,
                "actor_chat": {"id": -1001, "type": "supergroup", "title": "Rust"},
                "date": 1714550400,
                "old_reaction": [],
                "new_reaction": [{"type": "emoji", "emoji": "👍"}]
            }"#,
        );
        assert_eq!(ReactionChange::from_update(&reaction), None);
    }
}
