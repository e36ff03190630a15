//! Centralized configuration: Redis key layout, fixed intervals, and the
//! runtime settings read from the environment.

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use teloxide::types::UserId;

use crate::punishment::Ladder;

/// **Redis Key Prefixes:** identify categories of data stored in Redis.
pub mod key {
    /// Prefix for user hashes (e.g. `"tg:users:<user_id>"`).
    pub const TG_USERS_PREFIX: &str = "tg:users:";
    /// Hash mapping lower-cased usernames to user ids.
    pub const TG_USERNAMES: &str = "tg:usernames";
    /// Prefix for chat hashes (e.g. `"tg:chats:<chat_id>"`).
    pub const TG_CHATS_PREFIX: &str = "tg:chats:";
    /// Set of every chat the bot is a member of.
    pub const TG_CHAT_INDEX: &str = "tg:chat_index";
    /// Prefix for message author records (e.g. `"tg:msg:<chat_id>:<message_id>"`).
    pub const TG_MESSAGE_PREFIX: &str = "tg:msg:";
    /// Prefix for per-day statistics (e.g. `"tg:stats:<chat_id>:<day>"`).
    pub const TG_STATS_PREFIX: &str = "tg:stats:";
    /// Hash of templates, name -> JSON.
    pub const TEMPLATES: &str = "tg:templates";
    /// Prefix for punishment state (e.g. `"tg:punish:<chat_id>:<user_id>"`).
    pub const PUNISH_PREFIX: &str = "tg:punish:";
    /// Sorted set of `<chat_id>:<user_id>` scored by the last level change.
    pub const PUNISH_LEVELS: &str = "tg:punish_levels";
    /// Hash of release notes, version -> JSON.
    pub const RELEASE_NOTES: &str = "tg:release_notes";
    /// Sorted set of release versions scored by creation time.
    pub const RELEASE_ORDER: &str = "tg:release_order";
    /// Hash of pending antibot verifications, `<chat_id>:<user_id>` -> JSON.
    pub const VERIFICATIONS: &str = "tg:verify";
    /// Sorted set of pending verifications scored by deadline.
    pub const VERIFY_DEADLINES: &str = "tg:verify_deadlines";
    /// Stored schema version.
    pub const SCHEMA_VERSION: &str = "schema:version";
}

/// **Redis Key Suffixes:** common endings for composite keys.
pub mod suffix {
    /// Per-day ranking of messages sent, by user.
    pub const MESSAGES: &str = ":messages";
    /// Per-day ranking of reactions received, by user.
    pub const REACTIONS_RECEIVED: &str = ":reactions_received";
    /// Per-day ranking of reactions given, by user.
    pub const REACTIONS_GIVEN: &str = ":reactions_given";
    /// Per-day ranking of replies received, by user.
    pub const REPLIES_RECEIVED: &str = ":replies_received";
    /// Per-day ranking of replies sent, by user.
    pub const REPLIES_SENT: &str = ":replies_sent";
    /// Per-day scalar totals.
    pub const TOTALS: &str = ":totals";
    /// Punishment history list.
    pub const HISTORY: &str = ":history";
}

/// **Redis Hash Field Names.**
pub mod field {
    pub const USERNAME: &str = "username";
    pub const FULL_NAME: &str = "full_name";
    pub const IS_BOT: &str = "is_bot";
    pub const FIRST_SEEN: &str = "first_seen";
    pub const LAST_SEEN: &str = "last_seen";
    pub const TITLE: &str = "title";
    pub const KIND: &str = "kind";
    pub const ANTIBOT: &str = "antibot";
    pub const REPORTS: &str = "reports";
    pub const WELCOME: &str = "welcome";
    pub const LAST_REPORTED_DAY: &str = "last_reported_day";
    pub const LAST_RELEASE: &str = "last_release";
    /// Message author in a `tg:msg:*` hash.
    pub const AUTHOR: &str = "author";
    /// Total messages in a day totals hash.
    pub const TOTAL_MESSAGES: &str = "messages";
    /// Members joined in a day totals hash.
    pub const JOINED: &str = "joined";
    /// Punishments issued in a day totals hash.
    pub const PUNISHMENTS: &str = "punishments";
    /// Current ladder level in a punishment hash.
    pub const LEVEL: &str = "level";
    /// Timestamp of the last level change in a punishment hash.
    pub const LEVEL_UPDATED_AT: &str = "level_updated_at";
}

/// How long message authors are remembered for reaction and reply attribution.
pub const MESSAGE_META_TTL: i64 = 7 * 24 * 60 * 60; // 7 days

/// How long per-day statistics are kept.
pub const STATS_TTL: i64 = 35 * 24 * 60 * 60; // 35 days

/// Punishment level decay interval used when none is configured (48 hours).
pub const DEFAULT_PUNISHMENT_DECAY: i64 = 48 * 60 * 60;

/// Maximum punishment records kept per user and chat.
pub const MAX_PUNISHMENT_HISTORY: isize = 50;

/// Ladder used when `PUNISHMENT_LADDER` is not set.
pub const DEFAULT_LADDER: &str = "warn,warn,mute:1h,mute:1d,ban";

/// How often the antibot sweeper looks for expired challenges.
pub const ANTIBOT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// How often punishment levels are checked for decay.
pub const DECAY_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Current storage schema version, see [`crate::migration`].
pub const SCHEMA_VERSION: i64 = 1;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub redis_url: String,
    pub api_addr: SocketAddr,
    /// Bearer token for `/api/*`. The API is not served without one.
    pub api_token: Option<String>,
    pub utc_offset_hours: i32,
    pub report_hour: u32,
    pub report_top_n: usize,
    pub antibot_timeout: Duration,
    pub ladder: Ladder,
    pub punishment_decay: Duration,
    pub superadmins: Vec<UserId>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN").ok_or_else(|| anyhow!("BOT_TOKEN must be set"))?;

        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1/".to_string());

        let api_addr = lookup("API_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("API_ADDR is not a socket address")?;

        let api_token = lookup("API_TOKEN").filter(|t| !t.trim().is_empty());

        let utc_offset_hours: i32 = parse_or(&lookup, "UTC_OFFSET_HOURS", 0)?;
        if !(-12..=14).contains(&utc_offset_hours) {
            return Err(anyhow!("UTC_OFFSET_HOURS out of range: {}", utc_offset_hours));
        }

        let report_hour: u32 = parse_or(&lookup, "REPORT_HOUR", 9)?;
        if report_hour > 23 {
            return Err(anyhow!("REPORT_HOUR must be within 0..=23, got {}", report_hour));
        }

        let report_top_n: usize = parse_or(&lookup, "REPORT_TOP_N", 5)?;
        let antibot_secs: u64 = parse_or(&lookup, "ANTIBOT_TIMEOUT_SECS", 120)?;

        let ladder = lookup("PUNISHMENT_LADDER")
            .unwrap_or_else(|| DEFAULT_LADDER.to_string())
            .parse::<Ladder>()
            .context("PUNISHMENT_LADDER is invalid")?;

        let decay_hours: u64 = parse_or(
            &lookup,
            "PUNISHMENT_DECAY_HOURS",
            (DEFAULT_PUNISHMENT_DECAY / 3600) as u64,
        )?;

        let superadmins = match lookup("SUPERADMINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u64>().map(UserId))
                .collect::<Result<Vec<_>, _>>()
                .context("SUPERADMINS must be a comma separated list of user ids")?,
            None => Vec::new(),
        };

        Ok(Settings {
            bot_token,
            redis_url,
            api_addr,
            api_token,
            utc_offset_hours,
            report_hour,
            report_top_n,
            antibot_timeout: Duration::from_secs(antibot_secs),
            ladder,
            punishment_decay: Duration::from_secs(decay_hours * 3600),
            superadmins,
        })
    }

    /// The configured local time zone.
    pub fn local_offset(&self) -> FixedOffset {
        // Range checked in `from_lookup`.
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or(Utc.fix())
    }

    pub fn is_superadmin(&self, user: UserId) -> bool {
        self.superadmins.contains(&user)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        None => Ok(default),
    }
}
