//! Daily activity reports: when to send them and what they say.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use teloxide::utils::html;

use crate::db::{DayStats, RankEntry};
use crate::tasks::Job;
use crate::AppContext;

/// Calendar day of `now` in the given time zone.
pub fn local_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// The first local `hour:00` strictly after `now`.
pub fn next_run(now: DateTime<Utc>, hour: u32, offset: FixedOffset) -> DateTime<Utc> {
    let today = local_day(now, offset);
    for day in [today, today + Duration::days(1)] {
        let candidate = day
            .and_hms_opt(hour, 0, 0)
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .map(|local| local.with_timezone(&Utc));
        if let Some(candidate) = candidate {
            if candidate > now {
                return candidate;
            }
        }
    }
    // Only reachable with an hour outside 0..=23.
    now + Duration::days(1)
}

fn push_ranking(out: &mut Vec<String>, title: &str, entries: &[RankEntry]) {
    if entries.is_empty() {
        return;
    }
    out.push(String::new());
    out.push(format!("<b>{}</b>", title));
    for (place, entry) in entries.iter().enumerate() {
        out.push(format!(
            "{}. {} — {}",
            place + 1,
            html::escape(&entry.name),
            entry.count
        ));
    }
}

/// HTML report body for one chat and one day.
pub fn format_report(chat_title: &str, stats: &DayStats) -> String {
    let mut out = vec![format!(
        "📊 <b>Report for {}</b> · {}",
        html::escape(chat_title),
        stats.day.format("%Y-%m-%d")
    )];

    if stats.is_empty() {
        out.push(String::new());
        out.push("No activity.".to_string());
        return out.join("\n");
    }

    out.push(String::new());
    out.push(format!("💬 Messages: {}", stats.messages));
    out.push(format!("👥 Active members: {}", stats.active_users));
    out.push(format!("🆕 Joined: {}", stats.joined));
    out.push(format!("⚖️ Punishments: {}", stats.punishments));

    push_ranking(&mut out, "Most messages", &stats.top_messages);
    push_ranking(&mut out, "Most reactions received", &stats.top_reactions);
    push_ranking(&mut out, "Most replies received", &stats.top_replies);
    out.join("\n")
}

/// Send the report for `day` unless it was already sent. Returns whether it was sent.
pub async fn send_daily_report(
    bot: &Bot,
    ctx: &AppContext,
    chat_id: ChatId,
    day: NaiveDate,
) -> Result<bool> {
    if let Some(last) = ctx.db.last_reported_day(chat_id).await? {
        if last >= day {
            log::debug!("Report for chat {} on {} already sent", chat_id, day);
            return Ok(false);
        }
    }
    let title = ctx
        .db
        .get_chat(chat_id)
        .await?
        .map(|c| c.title)
        .unwrap_or_else(|| chat_id.0.to_string());
    let stats = ctx
        .db
        .day_stats(chat_id, day, ctx.settings.report_top_n)
        .await?;

    bot.send_message(chat_id, format_report(&title, &stats))
        .parse_mode(ParseMode::Html)
        .await?;
    ctx.db.set_last_reported_day(chat_id, day).await?;
    log::info!("Sent daily report for {} to chat {}", day, chat_id);
    Ok(true)
}

/// Queue yesterday's report for every chat that has reports on.
pub async fn queue_reports(ctx: &AppContext, now: DateTime<Utc>) -> Result<usize> {
    let yesterday = local_day(now, ctx.settings.local_offset()) - Duration::days(1);
    let mut queued = 0;
    for chat in ctx.db.list_chats().await? {
        if !chat.settings.reports {
            continue;
        }
        ctx.queue
            .push(Job::SendDailyReport {
                chat_id: ChatId(chat.id),
                day: yesterday,
            })
            .await?;
        queued += 1;
    }
    Ok(queued)
}

/// Wake up at the report hour every day and queue the reports.
pub async fn run_scheduler(ctx: Arc<AppContext>) {
    loop {
        let now = Utc::now();
        let at = next_run(now, ctx.settings.report_hour, ctx.settings.local_offset());
        log::info!("Next daily reports at {}", at);
        let wait = (at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match queue_reports(&ctx, Utc::now()).await {
            Ok(count) => log::info!("Queued {} daily reports", count),
            Err(e) => log::error!("Error queueing daily reports: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_local_day() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(local_day(utc("2024-05-01T22:30:00Z"), offset), day("2024-05-02"));
        let utc0 = FixedOffset::east_opt(0).unwrap();
        assert_eq!(local_day(utc("2024-05-01T22:30:00Z"), utc0), day("2024-05-01"));
    }

    #[test]
    fn test_next_run_same_day() {
        let utc0 = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            next_run(utc("2024-05-01T06:15:00Z"), 9, utc0),
            utc("2024-05-01T09:00:00Z")
        );
    }

    #[test]
    fn test_next_run_is_strictly_after() {
        let utc0 = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            next_run(utc("2024-05-01T09:00:00Z"), 9, utc0),
            utc("2024-05-02T09:00:00Z")
        );
        assert_eq!(
            next_run(utc("2024-05-01T23:59:59Z"), 9, utc0),
            utc("2024-05-02T09:00:00Z")
        );
    }

    #[test]
    fn test_next_run_with_offset() {
        // 09:00 at UTC+3 is 06:00 UTC.
        let msk = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(
            next_run(utc("2024-05-01T05:00:00Z"), 9, msk),
            utc("2024-05-01T06:00:00Z")
        );
        assert_eq!(
            next_run(utc("2024-05-01T07:00:00Z"), 9, msk),
            utc("2024-05-02T06:00:00Z")
        );
    }

    #[test]
    fn test_format_empty_report() {
        let stats = DayStats::empty(ChatId(-1), day("2024-05-01"));
        let text = format_report("Rust <chat>", &stats);
        assert!(text.contains("Rust &lt;chat&gt;"));
        assert!(text.contains("2024-05-01"));
        assert!(text.contains("No activity."));
        assert!(!text.contains("Messages"));
    }

    #[test]
    fn test_format_report_rankings() {
        let mut stats = DayStats::empty(ChatId(-1), day("2024-05-01"));
        stats.messages = 42;
        stats.active_users = 2;
        stats.top_messages = vec![
            RankEntry { user_id: 1, name: "Ada".into(), count: 30 },
            RankEntry { user_id: 2, name: "Bob & co".into(), count: 12 },
        ];
        let text = format_report("Rust", &stats);
        assert!(text.contains("💬 Messages: 42"));
        assert!(text.contains("👥 Active members: 2"));
        assert!(text.contains("<b>Most messages</b>\n1. Ada — 30\n2. Bob &amp; co — 12"));
        assert!(!text.contains("Most reactions received"));
        assert!(!text.contains("Most replies received"));
    }
}
