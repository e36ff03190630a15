use anyhow::Result;
use chrono::NaiveDate;
use redis::AsyncCommands;
use teloxide::types::{ChatId, MessageId, UserId};

use super::{stats_key, Db};
use crate::config::{field, key, suffix, MESSAGE_META_TTL, STATS_TTL};

pub(crate) fn message_key(chat_id: ChatId, message_id: MessageId) -> String {
    format!("{}{}:{}", key::TG_MESSAGE_PREFIX, chat_id.0, message_id.0)
}

impl Db {
    /// Count a message for its author and remember who wrote it, so later
    /// reactions and replies can be credited.
    pub async fn record_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        author: UserId,
        day: NaiveDate,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let ranking = stats_key(chat_id, day, suffix::MESSAGES);
        let totals = stats_key(chat_id, day, suffix::TOTALS);
        let meta = message_key(chat_id, message_id);

        let _: () = redis::pipe()
            .atomic()
            .zincr(&ranking, author.0, 1)
            .ignore()
            .expire(&ranking, STATS_TTL)
            .ignore()
            .hincr(&totals, field::TOTAL_MESSAGES, 1)
            .ignore()
            .expire(&totals, STATS_TTL)
            .ignore()
            .hset(&meta, field::AUTHOR, author.0)
            .ignore()
            .expire(&meta, MESSAGE_META_TTL)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Author of a tracked message, if it is still remembered.
    pub async fn message_author(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<UserId>> {
        let mut conn = self.conn().await?;
        let author: Option<u64> = conn.hget(message_key(chat_id, message_id), field::AUTHOR).await?;
        Ok(author.map(UserId))
    }

    /// Count a member who joined the chat.
    pub async fn record_join(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        let mut conn = self.conn().await?;
        let totals = stats_key(chat_id, day, suffix::TOTALS);
        let _: () = redis::pipe()
            .hincr(&totals, field::JOINED, 1)
            .ignore()
            .expire(&totals, STATS_TTL)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
