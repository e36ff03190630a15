use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use super::chats::chat_key;
use super::Db;
use crate::config::{field, key};

/// What changed in a bot release, announced to every chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseNote {
    pub version: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Versions are single tokens like `1.4.0` or `2024-05`.
pub fn validate_version(raw: &str) -> Result<String> {
    let version = raw.trim();
    if version.is_empty() || version.len() > 32 || version.chars().any(char::is_whitespace) {
        return Err(anyhow!("Version must be 1-32 characters without spaces"));
    }
    Ok(version.to_string())
}

impl ReleaseNote {
    pub fn new(version: &str, text: &str) -> Result<Self> {
        let version = validate_version(version)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("Release note text must not be empty"));
        }
        Ok(ReleaseNote {
            version,
            text: text.to_string(),
            created_at: Utc::now(),
        })
    }
}

impl Db {
    /// Store a new note. Returns `false` if the version already exists.
    pub async fn add_release_note(&self, note: &ReleaseNote) -> Result<bool> {
        let mut conn = self.conn().await?;
        let data = serde_json::to_string(note)?;
        let created: bool = conn.hset_nx(key::RELEASE_NOTES, &note.version, data).await?;
        if created {
            let _: () = conn
                .zadd(key::RELEASE_ORDER, &note.version, note.created_at.timestamp_millis())
                .await?;
        }
        Ok(created)
    }

    pub async fn get_release_note(&self, version: &str) -> Result<Option<ReleaseNote>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn.hget(key::RELEASE_NOTES, version).await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn latest_release_note(&self) -> Result<Option<ReleaseNote>> {
        Ok(self.list_release_notes(1).await?.into_iter().next())
    }

    /// Newest first.
    pub async fn list_release_notes(&self, limit: usize) -> Result<Vec<ReleaseNote>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let versions: Vec<String> = conn
            .zrevrange(key::RELEASE_ORDER, 0, super::range_stop(limit))
            .await?;
        let mut notes = Vec::with_capacity(versions.len());
        for version in versions {
            if let Some(note) = self.get_release_note(&version).await? {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    /// Last release version announced in a chat.
    pub async fn last_release(&self, chat_id: ChatId) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(chat_key(chat_id), field::LAST_RELEASE).await?)
    }

    pub async fn set_last_release(&self, chat_id: ChatId, version: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(chat_key(chat_id), field::LAST_RELEASE, version).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_note_validation() {
        assert!(ReleaseNote::new("", "text").is_err());
        assert!(ReleaseNote::new("1.0 beta", "text").is_err());
        assert!(ReleaseNote::new("1.0", "  ").is_err());

        let note = ReleaseNote::new(" 1.2.0 ", " New reports ").unwrap();
        assert_eq!(note.version, "1.2.0");
        assert_eq!(note.text, "New reports");
    }
}
