use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use teloxide::types::{ChatId, UserId};

use super::{stats_key, Db};
use crate::config::{field, key, suffix, MAX_PUNISHMENT_HISTORY, STATS_TTL};
use crate::punishment::PunishmentKind;

/// One moderation action taken against a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunishmentRecord {
    pub kind: PunishmentKind,
    pub reason: Option<String>,
    pub issued_by: u64,
    pub issued_at: DateTime<Utc>,
    /// End of a mute; `None` for everything else.
    pub until: Option<DateTime<Utc>>,
}

fn punish_key(chat_id: ChatId, user_id: UserId) -> String {
    format!("{}{}:{}", key::PUNISH_PREFIX, chat_id.0, user_id.0)
}

fn level_member(chat_id: ChatId, user_id: UserId) -> String {
    format!("{}:{}", chat_id.0, user_id.0)
}

/// Inverse of `level_member`.
pub(crate) fn parse_level_member(member: &str) -> Option<(ChatId, UserId)> {
    let (chat, user) = member.rsplit_once(':')?;
    Some((ChatId(chat.parse().ok()?), UserId(user.parse().ok()?)))
}

impl Db {
    /// Current ladder level of a user in a chat (0 = clean).
    pub async fn get_level(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        let mut conn = self.conn().await?;
        let level: Option<u32> = conn.hget(punish_key(chat_id, user_id), field::LEVEL).await?;
        Ok(level.unwrap_or(0))
    }

    pub async fn set_level(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        level: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let member = level_member(chat_id, user_id);
        let _: () = conn
            .hset_multiple(
                punish_key(chat_id, user_id),
                &[
                    (field::LEVEL, level as i64),
                    (field::LEVEL_UPDATED_AT, now.timestamp()),
                ],
            )
            .await?;
        if level == 0 {
            let _: () = conn.zrem(key::PUNISH_LEVELS, member).await?;
        } else {
            let _: () = conn.zadd(key::PUNISH_LEVELS, member, now.timestamp()).await?;
        }
        Ok(())
    }

    /// Append to the user's history and count the punishment for the day.
    pub async fn push_record(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        record: &PunishmentRecord,
        day: NaiveDate,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let history = format!("{}{}", punish_key(chat_id, user_id), suffix::HISTORY);
        let totals = stats_key(chat_id, day, suffix::TOTALS);
        let data = serde_json::to_string(record)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(&history, data)
            .ignore()
            .ltrim(&history, 0, MAX_PUNISHMENT_HISTORY - 1)
            .ignore();
        if record.kind.is_punishment() {
            pipe.hincr(&totals, field::PUNISHMENTS, 1)
                .ignore()
                .expire(&totals, STATS_TTL)
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Most recent records first.
    pub async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PunishmentRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let history = format!("{}{}", punish_key(chat_id, user_id), suffix::HISTORY);
        let raw: Vec<String> = conn.lrange(history, 0, super::range_stop(limit)).await?;
        let mut records = Vec::with_capacity(raw.len());
        for data in raw {
            match serde_json::from_str(&data) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable punishment record: {}", e),
            }
        }
        Ok(records)
    }

    /// Forget the level and the history.
    pub async fn reset_punishments(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let mut conn = self.conn().await?;
        let state = punish_key(chat_id, user_id);
        let history = format!("{}{}", state, suffix::HISTORY);
        let _: () = redis::pipe()
            .atomic()
            .del(&state)
            .ignore()
            .del(&history)
            .ignore()
            .zrem(key::PUNISH_LEVELS, level_member(chat_id, user_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Users whose level last changed at or before `cutoff`.
    pub async fn decay_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<(ChatId, UserId)>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .zrangebyscore(key::PUNISH_LEVELS, "-inf", cutoff.timestamp())
            .await?;
        Ok(members
            .iter()
            .filter_map(|m| parse_level_member(m))
            .collect())
    }

    /// Level and timestamp of the last change, as stored.
    pub async fn level_state(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<(u32, i64)>> {
        let mut conn = self.conn().await?;
        let hash: HashMap<String, i64> = conn.hgetall(punish_key(chat_id, user_id)).await?;
        match (hash.get(field::LEVEL), hash.get(field::LEVEL_UPDATED_AT)) {
            (Some(level), Some(at)) => Ok(Some(((*level).max(0) as u32, *at))),
            _ => Ok(None),
        }
    }
}
