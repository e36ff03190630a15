use anyhow::Result;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId, UserId};

use super::Db;
use crate::config::key;

/// A newcomer who has to press the verification button before `deadline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub chat_id: i64,
    pub user_id: u64,
    /// The challenge message holding the button.
    pub message_id: i32,
    pub deadline: DateTime<Utc>,
}

impl Verification {
    pub fn chat(&self) -> ChatId {
        ChatId(self.chat_id)
    }

    pub fn user(&self) -> UserId {
        UserId(self.user_id)
    }

    pub fn message(&self) -> MessageId {
        MessageId(self.message_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

fn member(chat_id: ChatId, user_id: UserId) -> String {
    format!("{}:{}", chat_id.0, user_id.0)
}

impl Db {
    pub async fn add_verification(&self, verification: &Verification) -> Result<()> {
        let mut conn = self.conn().await?;
        let member = member(verification.chat(), verification.user());
        let data = serde_json::to_string(verification)?;
        let _: () = redis::pipe()
            .atomic()
            .hset(key::VERIFICATIONS, &member, data)
            .ignore()
            .zadd(key::VERIFY_DEADLINES, &member, verification.deadline.timestamp())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_verification(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<Verification>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn
            .hget(key::VERIFICATIONS, member(chat_id, user_id))
            .await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Returns whether a pending verification existed. Only one caller can
    /// win this for a given record, which settles button/timeout races.
    pub async fn remove_verification(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn().await?;
        let member = member(chat_id, user_id);
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .hdel(key::VERIFICATIONS, &member)
            .zrem(key::VERIFY_DEADLINES, &member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    /// Verifications whose deadline is at or before `now`.
    pub async fn expired_verifications(&self, now: DateTime<Utc>) -> Result<Vec<Verification>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .zrangebyscore(key::VERIFY_DEADLINES, "-inf", now.timestamp())
            .await?;

        let mut expired = Vec::with_capacity(members.len());
        for member in members {
            let data: Option<String> = conn.hget(key::VERIFICATIONS, &member).await?;
            match data.map(|d| serde_json::from_str::<Verification>(&d)) {
                Some(Ok(verification)) => expired.push(verification),
                Some(Err(e)) => {
                    log::warn!("Dropping unreadable verification {}: {}", member, e);
                    let _: () = conn.hdel(key::VERIFICATIONS, &member).await?;
                    let _: () = conn.zrem(key::VERIFY_DEADLINES, &member).await?;
                }
                None => {
                    let _: () = conn.zrem(key::VERIFY_DEADLINES, &member).await?;
                }
            }
        }
        Ok(expired)
    }
}
