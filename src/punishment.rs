//! The punishment ladder: every offence moves a user one step further along
//! a configured list of sanctions, and quiet time moves them back.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatPermissions, UserId};
use tokio::time::sleep;

use crate::config::DECAY_CHECK_INTERVAL;
use crate::db::{Db, PunishmentRecord};

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,6})([smhdw])$").expect("valid duration regex"));

/// Shortest restriction Telegram honours; shorter ones never end.
pub const MIN_MUTE: Duration = Duration::from_secs(30);
/// Longest restriction Telegram honours; longer ones never end.
pub const MAX_MUTE: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Parse mute lengths like `30s`, `10m`, `2h`, `1d`, `1w`.
///
/// `Ok(None)` means the input is not a duration at all. A duration outside
/// [`MIN_MUTE`]..=[`MAX_MUTE`] is an error.
pub fn parse_duration(input: &str) -> Result<Option<Duration>> {
    let Some(caps) = DURATION.captures(input.trim()) else {
        return Ok(None);
    };
    let amount: u64 = caps[1].parse()?;
    let unit = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => 7 * 24 * 60 * 60,
    };
    let duration = Duration::from_secs(amount * unit);
    if duration < MIN_MUTE || duration > MAX_MUTE {
        return Err(anyhow!(
            "Mute length {} is out of range: use {} to {}",
            input.trim(),
            format_duration(MIN_MUTE),
            format_duration(MAX_MUTE)
        ));
    }
    Ok(Some(duration))
}

/// Inverse of [`parse_duration`], using the largest unit that divides evenly.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    for (unit, suffix) in [(7 * 24 * 3600, "w"), (24 * 3600, "d"), (3600, "h"), (60, "m")] {
        if secs >= unit && secs % unit == 0 {
            return format!("{}{}", secs / unit, suffix);
        }
    }
    format!("{}s", secs)
}

/// A moderation action. The first three are ladder steps; the rest lift them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PunishmentKind {
    Warn,
    Mute { seconds: u64 },
    Ban,
    Unmute,
    Unban,
}

impl PunishmentKind {
    pub fn mute(duration: Duration) -> Self {
        PunishmentKind::Mute {
            seconds: duration.as_secs(),
        }
    }

    /// Whether this is a sanction rather than lifting one.
    pub fn is_punishment(&self) -> bool {
        matches!(
            self,
            PunishmentKind::Warn | PunishmentKind::Mute { .. } | PunishmentKind::Ban
        )
    }

    /// Same action ignoring the mute length.
    fn same_variant(&self, other: &PunishmentKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// When a mute issued at `now` ends.
    pub fn until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PunishmentKind::Mute { seconds } => {
                Some(now + chrono::Duration::seconds(*seconds as i64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PunishmentKind::Warn => write!(f, "warning"),
            PunishmentKind::Mute { seconds } => {
                write!(f, "mute for {}", format_duration(Duration::from_secs(*seconds)))
            }
            PunishmentKind::Ban => write!(f, "ban"),
            PunishmentKind::Unmute => write!(f, "unmute"),
            PunishmentKind::Unban => write!(f, "unban"),
        }
    }
}

/// Ordered sanctions. Level `n` means the next offence gets step `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder(Vec<PunishmentKind>);

impl Ladder {
    pub fn new(steps: Vec<PunishmentKind>) -> Result<Self> {
        if steps.is_empty() {
            return Err(anyhow!("The punishment ladder needs at least one step"));
        }
        if let Some(bad) = steps.iter().find(|s| !s.is_punishment()) {
            return Err(anyhow!("{} cannot be a ladder step", bad));
        }
        if let Some(pos) = steps.iter().position(|s| *s == PunishmentKind::Ban) {
            if pos != steps.len() - 1 {
                return Err(anyhow!("ban can only be the last ladder step"));
            }
        }
        Ok(Ladder(steps))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[PunishmentKind] {
        &self.0
    }

    /// Step applied to a user at `level`. Past the end the last step repeats.
    pub fn step_for(&self, level: u32) -> PunishmentKind {
        let last = self.0.len() - 1;
        self.0[(level as usize).min(last)]
    }

    /// Level after an explicitly chosen action.
    ///
    /// If the action matches the user's current step it counts as that step
    /// and the level advances. Otherwise the level is raised to just past the
    /// first step of the same kind, and never lowered. Kinds the ladder does
    /// not contain leave the level as it is.
    pub fn level_after(&self, current: u32, kind: &PunishmentKind) -> u32 {
        if self.step_for(current).same_variant(kind) {
            let cap = self.0.len() as u32;
            return (current + 1).min(cap);
        }
        match self.0.iter().position(|s| s.same_variant(kind)) {
            Some(pos) => current.max(pos as u32 + 1),
            None => current,
        }
    }
}

impl FromStr for Ladder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let steps = s
            .split(',')
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .map(|step| match step {
                "warn" => Ok(PunishmentKind::Warn),
                "ban" => Ok(PunishmentKind::Ban),
                other => match other.strip_prefix("mute:") {
                    Some(duration) => parse_duration(duration)?
                        .map(PunishmentKind::mute)
                        .ok_or_else(|| anyhow!("Invalid mute duration {:?}", duration)),
                    None => Err(anyhow!("Unknown ladder step {:?}", other)),
                },
            })
            .collect::<Result<Vec<_>>>()?;
        Ladder::new(steps)
    }
}

/// Result of a punishment that was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub record: PunishmentRecord,
    /// Level after the action.
    pub level: u32,
}

/// Keeps punishment levels and history in storage and moves users along the ladder.
#[derive(Clone)]
pub struct PunishmentManager {
    db: Db,
    ladder: Ladder,
    decay: Duration,
}

impl PunishmentManager {
    pub fn new(db: Db, ladder: Ladder, decay: Duration) -> Self {
        PunishmentManager { db, ladder, decay }
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    /// The sanction a user's next offence gets.
    pub async fn next_step(&self, chat_id: ChatId, user_id: UserId) -> Result<PunishmentKind> {
        let level = self.db.get_level(chat_id, user_id).await?;
        Ok(self.ladder.step_for(level))
    }

    /// Apply the next ladder step to a user and advance their level.
    pub async fn escalate(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        issued_by: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<Applied> {
        let level = self.db.get_level(chat_id, user_id).await?;
        let kind = self.ladder.step_for(level);
        let new_level = (level + 1).min(self.ladder.len() as u32);
        self.store(chat_id, user_id, kind, issued_by, reason, new_level, now, day)
            .await
    }

    /// Current level of a user in a chat.
    pub async fn level(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        self.db.get_level(chat_id, user_id).await
    }

    /// Record an action an admin chose directly (`/warn`, `/mute`, `/ban`).
    #[allow(clippy::too_many_arguments)]
    pub async fn punish(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        kind: PunishmentKind,
        issued_by: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<Applied> {
        let level = self.db.get_level(chat_id, user_id).await?;
        let new_level = if kind.is_punishment() {
            self.ladder.level_after(level, &kind)
        } else {
            level
        };
        self.store(chat_id, user_id, kind, issued_by, reason, new_level, now, day)
            .await
    }

    /// Clear the level and history of a user in a chat.
    pub async fn amnesty(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.db.reset_punishments(chat_id, user_id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn store(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        kind: PunishmentKind,
        issued_by: UserId,
        reason: Option<String>,
        level: u32,
        now: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<Applied> {
        let record = PunishmentRecord {
            kind,
            reason: reason.filter(|r| !r.trim().is_empty()),
            issued_by: issued_by.0,
            issued_at: now,
            until: kind.until(now),
        };
        self.db.push_record(chat_id, user_id, &record, day).await?;
        if kind.is_punishment() {
            self.db.set_level(chat_id, user_id, level, now).await?;
        }
        Ok(Applied { record, level })
    }

    /// Lower by one every level that has not changed for the decay interval.
    /// Returns how many levels were lowered.
    pub async fn decay_levels(&self, now: DateTime<Utc>) -> Result<usize> {
        let decay = chrono::Duration::from_std(self.decay)?;
        let cutoff = now - decay;
        let mut reduced = 0;

        for (chat_id, user_id) in self.db.decay_candidates(cutoff).await? {
            let level = self.db.get_level(chat_id, user_id).await?;
            let new_level = level.saturating_sub(1);
            self.db.set_level(chat_id, user_id, new_level, now).await?;
            if level > 0 {
                log::info!(
                    "Reduced punishment level for user {} in chat {} from {} to {}",
                    user_id, chat_id, level, new_level
                );
                reduced += 1;
            }
        }
        Ok(reduced)
    }

    pub async fn start_decay_loop(self) {
        loop {
            if let Err(e) = self.decay_levels(Utc::now()).await {
                log::error!("Error reducing punishment levels: {}", e);
            }
            sleep(DECAY_CHECK_INTERVAL).await;
        }
    }
}

/// Carry out an action on Telegram. Warnings have no side effect here.
pub async fn enforce(
    bot: &Bot,
    chat_id: ChatId,
    user_id: UserId,
    kind: &PunishmentKind,
    now: DateTime<Utc>,
) -> Result<()> {
    match kind {
        PunishmentKind::Warn => {}
        PunishmentKind::Mute { .. } => {
            let mut request = bot.restrict_chat_member(chat_id, user_id, ChatPermissions::empty());
            if let Some(until) = kind.until(now) {
                request = request.until_date(until);
            }
            request.await?;
        }
        PunishmentKind::Ban => {
            bot.ban_chat_member(chat_id, user_id).await?;
        }
        PunishmentKind::Unmute => {
            bot.restrict_chat_member(chat_id, user_id, ChatPermissions::all())
                .await?;
        }
        PunishmentKind::Unban => {
            bot.unban_chat_member(chat_id, user_id)
                .only_if_banned(true)
                .await?;
        }
    }
    Ok(())
}
