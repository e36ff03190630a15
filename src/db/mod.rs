//! Redis-backed repositories. Each submodule adds the queries for one kind
//! of record as methods on [`Db`].

pub mod users;
pub mod chats;
pub mod messages;
pub mod reactions;
pub mod replies;
pub mod stats;
pub mod templates;
pub mod punishments;
pub mod release_notes;
pub mod verifications;

pub use chats::{ChatRecord, ChatSettings};
pub use punishments::PunishmentRecord;
pub use release_notes::ReleaseNote;
pub use stats::{DayStats, RankEntry, UserDayStats};
pub use templates::Template;
pub use users::UserRecord;
pub use verifications::Verification;

use anyhow::Result;
use chrono::NaiveDate;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::OnceCell;

use crate::config::key;

/// Handle to the storage. Cheap to clone; the connection is opened on first use
/// and shared afterwards.
#[derive(Clone)]
pub struct Db {
    client: redis::Client,
    conn: Arc<OnceCell<MultiplexedConnection>>,
}

impl Db {
    /// Validate the URL. Does not connect yet.
    pub fn open(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Db {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// Get a Redis connection
    pub async fn conn(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async { self.client.get_multiplexed_async_connection().await })
            .await?;
        Ok(conn.clone())
    }
}

/// Key of a per-day statistics structure, e.g. `tg:stats:-100:2024-05-01:messages`.
pub(crate) fn stats_key(chat: ChatId, day: NaiveDate, suffix: &str) -> String {
    format!("{}{}:{}{}", key::TG_STATS_PREFIX, chat.0, day.format("%Y-%m-%d"), suffix)
}

/// Inclusive stop index for a Redis range returning at most `limit` items.
pub(crate) fn range_stop(limit: usize) -> isize {
    isize::try_from(limit).unwrap_or(isize::MAX).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::suffix;

    #[test]
    fn test_stats_key() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            stats_key(ChatId(-100), day, suffix::MESSAGES),
            "tg:stats:-100:2024-05-01:messages"
        );
    }

    #[test]
    fn test_range_stop() {
        assert_eq!(range_stop(1), 0);
        assert_eq!(range_stop(20), 19);
        assert_eq!(range_stop(usize::MAX), isize::MAX - 1);
        assert_eq!(range_stop(1 << 63), isize::MAX - 1);
    }

    #[test]
    fn test_open_rejects_bad_url() {
        assert!(Db::open("redis://127.0.0.1/").is_ok());
        assert!(Db::open("invalid://url").is_err());
    }
}
