use anyhow::Result;
use chrono::NaiveDate;
use teloxide::types::{ChatId, UserId};

use super::reactions::adjust_score;
use super::{stats_key, Db};
use crate::config::suffix;

impl Db {
    /// Count a reply from `from` to a message written by `to`.
    /// Replying to oneself is not counted. Returns whether it was counted.
    pub async fn record_reply(
        &self,
        chat_id: ChatId,
        from: UserId,
        to: UserId,
        day: NaiveDate,
    ) -> Result<bool> {
        if from == to {
            return Ok(false);
        }
        adjust_score(self, &stats_key(chat_id, day, suffix::REPLIES_SENT), from, 1).await?;
        adjust_score(self, &stats_key(chat_id, day, suffix::REPLIES_RECEIVED), to, 1).await?;
        Ok(true)
    }
}
