use anyhow::Result;
use chrono::NaiveDate;
use redis::AsyncCommands;
use teloxide::types::{ChatId, MessageId, UserId};

use super::{stats_key, Db};
use crate::config::{suffix, STATS_TTL};

impl Db {
    /// Apply a change in the number of reactions `actor` put on a message.
    ///
    /// The message author is credited with received reactions and the actor
    /// with given ones. A negative `delta` means reactions were taken back.
    /// Reactions to unknown messages and to one's own messages are ignored.
    ///
    /// Returns the credited author.
    pub async fn record_reaction(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        actor: UserId,
        delta: i64,
        day: NaiveDate,
    ) -> Result<Option<UserId>> {
        if delta == 0 {
            return Ok(None);
        }
        let author = match self.message_author(chat_id, message_id).await? {
            Some(author) if author != actor => author,
            _ => return Ok(None),
        };

        let received = stats_key(chat_id, day, suffix::REACTIONS_RECEIVED);
        let given = stats_key(chat_id, day, suffix::REACTIONS_GIVEN);
        adjust_score(self, &received, author, delta).await?;
        adjust_score(self, &given, actor, delta).await?;
        Ok(Some(author))
    }
}

/// Add `delta` to a ranking member, dropping members that fall to zero.
/// Removals of reactions given before tracking started must not go negative.
pub(crate) async fn adjust_score(db: &Db, ranking: &str, user: UserId, delta: i64) -> Result<()> {
    let mut conn = db.conn().await?;
    let score: f64 = conn.zincr(ranking, user.0, delta).await?;
    if score <= 0.0 {
        let _: () = conn.zrem(ranking, user.0).await?;
    }
    let _: () = conn.expire(ranking, STATS_TTL).await?;
    Ok(())
}
