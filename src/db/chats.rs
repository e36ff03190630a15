use anyhow::Result;
use chrono::NaiveDate;
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use teloxide::types::{Chat, ChatId};

use super::Db;
use crate::config::{field, key};

/// Per-chat switches controlled by chat admins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatSettings {
    /// Mute newcomers until they press the verification button.
    pub antibot: bool,
    /// Post a report about the previous day every morning.
    pub reports: bool,
    /// Template sent to members who join (after verification when antibot is on).
    pub welcome: Option<String>,
}

/// A chat the bot is a member of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRecord {
    pub id: i64,
    pub title: String,
    pub kind: String,
    pub settings: ChatSettings,
}

impl ChatSettings {
    fn from_hash(hash: &HashMap<String, String>) -> Self {
        let flag = |name: &str| hash.get(name).map(|v| v == "1").unwrap_or(false);
        ChatSettings {
            antibot: flag(field::ANTIBOT),
            reports: flag(field::REPORTS),
            welcome: hash.get(field::WELCOME).filter(|w| !w.is_empty()).cloned(),
        }
    }
}

fn chat_kind(chat: &Chat) -> &'static str {
    if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else {
        "channel"
    }
}

pub(crate) fn chat_key(chat_id: ChatId) -> String {
    format!("{}{}", key::TG_CHATS_PREFIX, chat_id.0)
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl Db {
    /// Store the chat's title and type and add it to the chat index.
    pub async fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        let mut conn = self.conn().await?;
        let title = chat
            .title()
            .or_else(|| chat.username())
            .map(str::to_string)
            .unwrap_or_else(|| chat.id.0.to_string());

        let _: () = conn
            .hset_multiple(
                chat_key(chat.id),
                &[(field::TITLE, title), (field::KIND, chat_kind(chat).to_string())],
            )
            .await?;
        let _: () = conn.sadd(key::TG_CHAT_INDEX, chat.id.0).await?;
        Ok(())
    }

    pub async fn get_chat(&self, chat_id: ChatId) -> Result<Option<ChatRecord>> {
        let mut conn = self.conn().await?;
        let hash: HashMap<String, String> = conn.hgetall(chat_key(chat_id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChatRecord {
            id: chat_id.0,
            title: hash.get(field::TITLE).cloned().unwrap_or_default(),
            kind: hash.get(field::KIND).cloned().unwrap_or_default(),
            settings: ChatSettings::from_hash(&hash),
        }))
    }

    /// All chats in the index, ordered by id.
    pub async fn list_chats(&self) -> Result<Vec<ChatRecord>> {
        let mut conn = self.conn().await?;
        let mut ids: Vec<i64> = conn.smembers(key::TG_CHAT_INDEX).await?;
        ids.sort_unstable();

        let mut chats = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chat) = self.get_chat(ChatId(id)).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    /// The bot left or was removed; keep the record but stop treating it as active.
    pub async fn mark_left(&self, chat_id: ChatId) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.srem(key::TG_CHAT_INDEX, chat_id.0).await?;
        Ok(())
    }

    pub async fn get_settings(&self, chat_id: ChatId) -> Result<ChatSettings> {
        let mut conn = self.conn().await?;
        let hash: HashMap<String, String> = conn.hgetall(chat_key(chat_id)).await?;
        Ok(ChatSettings::from_hash(&hash))
    }

    pub async fn set_antibot(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(chat_key(chat_id), field::ANTIBOT, flag(enabled)).await?;
        Ok(())
    }

    pub async fn set_reports(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(chat_key(chat_id), field::REPORTS, flag(enabled)).await?;
        Ok(())
    }

    /// Set or clear the welcome template.
    pub async fn set_welcome(&self, chat_id: ChatId, template: Option<&str>) -> Result<()> {
        let mut conn = self.conn().await?;
        match template {
            Some(name) => {
                let _: () = conn.hset(chat_key(chat_id), field::WELCOME, name).await?;
            }
            None => {
                let _: () = conn.hdel(chat_key(chat_id), field::WELCOME).await?;
            }
        }
        Ok(())
    }

    pub async fn last_reported_day(&self, chat_id: ChatId) -> Result<Option<NaiveDate>> {
        let mut conn = self.conn().await?;
        let day: Option<String> = conn.hget(chat_key(chat_id), field::LAST_REPORTED_DAY).await?;
        Ok(day.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()))
    }

    pub async fn set_last_reported_day(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .hset(
                chat_key(chat_id),
                field::LAST_REPORTED_DAY,
                day.format("%Y-%m-%d").to_string(),
            )
            .await?;
        Ok(())
    }
}
