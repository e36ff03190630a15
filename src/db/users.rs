use anyhow::Result;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use teloxide::types::{User, UserId};

use super::Db;
use crate::config::{field, key};

/// A Telegram user the bot has seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: Option<String>,
    pub full_name: String,
    pub is_bot: bool,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl UserRecord {
    /// Name to show in reports: full name, then @username, then the id.
    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            self.full_name.clone()
        } else if let Some(username) = &self.username {
            format!("@{}", username)
        } else {
            self.id.to_string()
        }
    }

    fn from_hash(id: u64, hash: &HashMap<String, String>) -> Self {
        let get_i64 = |name: &str| {
            hash.get(name)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };
        UserRecord {
            id,
            username: hash
                .get(field::USERNAME)
                .filter(|u| !u.is_empty())
                .cloned(),
            full_name: hash.get(field::FULL_NAME).cloned().unwrap_or_default(),
            is_bot: hash.get(field::IS_BOT).map(|v| v == "1").unwrap_or(false),
            first_seen: get_i64(field::FIRST_SEEN),
            last_seen: get_i64(field::LAST_SEEN),
        }
    }
}

pub(crate) fn user_key(user_id: UserId) -> String {
    format!("{}{}", key::TG_USERS_PREFIX, user_id.0)
}

impl Db {
    /// Create or refresh a user record.
    pub async fn upsert_user(&self, user: &User, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn().await?;
        let user_key = user_key(user.id);
        let ts = now.timestamp().to_string();

        let _: bool = conn.hset_nx(&user_key, field::FIRST_SEEN, &ts).await?;
        let _: () = conn
            .hset_multiple(
                &user_key,
                &[
                    (field::USERNAME, user.username.clone().unwrap_or_default()),
                    (field::FULL_NAME, user.full_name()),
                    (field::IS_BOT, if user.is_bot { "1" } else { "0" }.to_string()),
                    (field::LAST_SEEN, ts),
                ],
            )
            .await?;

        if let Some(username) = &user.username {
            let _: () = conn
                .hset(key::TG_USERNAMES, username.to_lowercase(), user.id.0)
                .await?;
        }
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let mut conn = self.conn().await?;
        let hash: HashMap<String, String> = conn.hgetall(user_key(user_id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(UserRecord::from_hash(user_id.0, &hash)))
    }

    /// Look a user up by `@username` or `username`, case-insensitively.
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let name = username.trim().trim_start_matches('@').to_lowercase();
        if name.is_empty() {
            return Ok(None);
        }
        let mut conn = self.conn().await?;
        let id: Option<u64> = conn.hget(key::TG_USERNAMES, &name).await?;
        match id {
            Some(id) => self.get_user(UserId(id)).await,
            None => Ok(None),
        }
    }

    /// Display name for a user id, falling back to the id itself.
    pub async fn display_name(&self, user_id: UserId) -> Result<String> {
        Ok(self
            .get_user(user_id)
            .await?
            .map(|u| u.display_name())
            .unwrap_or_else(|| user_id.0.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_hash() {
        let mut hash = HashMap::new();
        hash.insert(field::USERNAME.to_string(), "".to_string());
        hash.insert(field::FULL_NAME.to_string(), "Ada Lovelace".to_string());
        hash.insert(field::IS_BOT.to_string(), "0".to_string());
        hash.insert(field::FIRST_SEEN.to_string(), "100".to_string());
        hash.insert(field::LAST_SEEN.to_string(), "200".to_string());

        let user = UserRecord::from_hash(42, &hash);
        assert_eq!(user.id, 42);
        assert_eq!(user.username, None);
        assert!(!user.is_bot);
        assert_eq!(user.first_seen, 100);
        assert_eq!(user.last_seen, 200);
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = UserRecord {
            id: 7,
            username: Some("ada".to_string()),
            full_name: " ".to_string(),
            is_bot: false,
            first_seen: 0,
            last_seen: 0,
        };
        assert_eq!(user.display_name(), "@ada");
        user.username = None;
        assert_eq!(user.display_name(), "7");
    }
}
