use anyhow::Result;
use chrono::NaiveDate;
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use teloxide::types::{ChatId, UserId};

use super::{stats_key, Db};
use crate::config::{field, suffix};

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub user_id: u64,
    pub name: String,
    pub count: i64,
}

/// Everything the daily report needs about one chat and one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub chat_id: i64,
    pub day: NaiveDate,
    pub messages: i64,
    pub active_users: i64,
    pub joined: i64,
    pub punishments: i64,
    pub top_messages: Vec<RankEntry>,
    pub top_reactions: Vec<RankEntry>,
    pub top_replies: Vec<RankEntry>,
}

impl DayStats {
    /// A day without any recorded activity.
    pub fn empty(chat_id: ChatId, day: NaiveDate) -> Self {
        DayStats {
            chat_id: chat_id.0,
            day,
            messages: 0,
            active_users: 0,
            joined: 0,
            punishments: 0,
            top_messages: Vec::new(),
            top_reactions: Vec::new(),
            top_replies: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages == 0 && self.joined == 0 && self.punishments == 0
    }
}

/// One user's activity in one chat on one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserDayStats {
    pub messages: i64,
    pub reactions_received: i64,
    pub replies_received: i64,
}

impl Db {
    pub async fn day_stats(&self, chat_id: ChatId, day: NaiveDate, top_n: usize) -> Result<DayStats> {
        let mut conn = self.conn().await?;
        let totals: HashMap<String, i64> = conn
            .hgetall(stats_key(chat_id, day, suffix::TOTALS))
            .await?;
        let active_users: i64 = conn.zcard(stats_key(chat_id, day, suffix::MESSAGES)).await?;

        let total = |name: &str| totals.get(name).copied().unwrap_or(0);
        Ok(DayStats {
            chat_id: chat_id.0,
            day,
            messages: total(field::TOTAL_MESSAGES),
            active_users,
            joined: total(field::JOINED),
            punishments: total(field::PUNISHMENTS),
            top_messages: self.ranking(chat_id, day, suffix::MESSAGES, top_n).await?,
            top_reactions: self
                .ranking(chat_id, day, suffix::REACTIONS_RECEIVED, top_n)
                .await?,
            top_replies: self
                .ranking(chat_id, day, suffix::REPLIES_RECEIVED, top_n)
                .await?,
        })
    }

    pub async fn user_stats(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<UserDayStats> {
        let mut conn = self.conn().await?;
        let mut scores = [0i64; 3];
        let suffixes = [suffix::MESSAGES, suffix::REACTIONS_RECEIVED, suffix::REPLIES_RECEIVED];
        for (slot, ranking) in scores.iter_mut().zip(suffixes) {
            let score: Option<f64> = conn.zscore(stats_key(chat_id, day, ranking), user_id.0).await?;
            *slot = score.unwrap_or(0.0) as i64;
        }
        let [messages, reactions_received, replies_received] = scores;
        Ok(UserDayStats {
            messages,
            reactions_received,
            replies_received,
        })
    }

    /// Top `top_n` members of a per-day ranking, highest first.
    async fn ranking(
        &self,
        chat_id: ChatId,
        day: NaiveDate,
        suffix: &str,
        top_n: usize,
    ) -> Result<Vec<RankEntry>> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let rows: Vec<(u64, f64)> = conn
            .zrevrange_withscores(stats_key(chat_id, day, suffix), 0, super::range_stop(top_n))
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (user_id, score) in rows {
            entries.push(RankEntry {
                user_id,
                name: self.display_name(UserId(user_id)).await?,
                count: score as i64,
            });
        }
        Ok(entries)
    }
}
