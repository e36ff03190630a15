//! Storage layout upgrades, applied on startup.

use anyhow::Result;
use redis::AsyncCommands;

use crate::config::{key, SCHEMA_VERSION};
use crate::db::Db;

/// Chat id encoded in a chat hash key, if `key` is one.
pub fn chat_id_from_key(raw: &str) -> Option<i64> {
    raw.strip_prefix(key::TG_CHATS_PREFIX)?.parse().ok()
}

/// Bring the storage up to [`SCHEMA_VERSION`]. Returns the version found.
/// Running it again is a no-op.
pub async fn run(db: &Db) -> Result<i64> {
    let mut conn = db.conn().await?;
    let found: Option<i64> = conn.get(key::SCHEMA_VERSION).await?;
    let found = found.unwrap_or(0);

    if found >= SCHEMA_VERSION {
        log::debug!("Storage schema is at version {}", found);
        return Ok(found);
    }

    if found < 1 {
        // Version 1 introduced the chat index; rebuild it from the chat hashes.
        let keys: Vec<String> = conn.keys(format!("{}*", key::TG_CHATS_PREFIX)).await?;
        let ids: Vec<i64> = keys.iter().filter_map(|k| chat_id_from_key(k)).collect();
        if !ids.is_empty() {
            let _: () = conn.sadd(key::TG_CHAT_INDEX, &ids).await?;
        }
        log::info!("Indexed {} chats", ids.len());
    }

    let _: () = conn.set(key::SCHEMA_VERSION, SCHEMA_VERSION).await?;
    log::info!("Storage schema migrated from version {} to {}", found, SCHEMA_VERSION);
    Ok(found)
}
