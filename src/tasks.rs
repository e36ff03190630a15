//! Background jobs. Handlers and the API queue work here instead of doing
//! slow fan-out sends inline; a single worker drains the queue.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use teloxide::utils::html;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::report::send_daily_report;
use crate::AppContext;

/// Delay between messages of a broadcast, to stay under Telegram's limits.
const BROADCAST_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    SendDailyReport { chat_id: ChatId, day: NaiveDate },
    BroadcastRelease { version: String },
}

/// Sending side of the job queue.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Job>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (TaskQueue { tx }, rx)
    }

    pub async fn push(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|e| anyhow!("Task worker is gone, dropped {:?}", e.0))
    }
}

/// Consume jobs until every sender is dropped. A failing job is logged and skipped.
pub async fn run_worker(bot: Bot, ctx: Arc<AppContext>, mut jobs: mpsc::Receiver<Job>) {
    log::info!("Task worker started");
    while let Some(job) = jobs.recv().await {
        log::debug!("Running job {:?}", job);
        if let Err(e) = process(&bot, &ctx, &job).await {
            log::error!("Job {:?} failed: {}", job, e);
        }
    }
    log::info!("Task worker stopped");
}

async fn process(bot: &Bot, ctx: &AppContext, job: &Job) -> Result<()> {
    match job {
        Job::SendDailyReport { chat_id, day } => {
            send_daily_report(bot, ctx, *chat_id, *day).await?;
        }
        Job::BroadcastRelease { version } => {
            let sent = broadcast_release(bot, ctx, version).await?;
            log::info!("Release {} announced in {} chats", version, sent);
        }
    }
    Ok(())
}

pub fn format_release_note(version: &str, text: &str) -> String {
    format!(
        "🚀 <b>What's new in {}</b>\n\n{}",
        html::escape(version),
        html::escape(text)
    )
}

/// Announce a release in every group that has not seen it yet.
/// Returns the number of chats it was sent to.
pub async fn broadcast_release(bot: &Bot, ctx: &AppContext, version: &str) -> Result<usize> {
    let note = ctx
        .db
        .get_release_note(version)
        .await?
        .ok_or_else(|| anyhow!("Release note {} does not exist", version))?;
    let text = format_release_note(&note.version, &note.text);

    let mut sent = 0;
    for chat in ctx.db.list_chats().await? {
        if chat.kind == "private" || chat.kind == "channel" {
            continue;
        }
        let chat_id = ChatId(chat.id);
        if ctx.db.last_release(chat_id).await?.as_deref() == Some(note.version.as_str()) {
            continue;
        }
        match bot
            .send_message(chat_id, &text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => {
                ctx.db.set_last_release(chat_id, &note.version).await?;
                sent += 1;
            }
            Err(e) => log::warn!("Could not announce release in chat {}: {}", chat_id, e),
        }
        sleep(BROADCAST_DELAY).await;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let (queue, mut rx) = TaskQueue::new(4);
        queue
            .push(Job::BroadcastRelease { version: "1.0".into() })
            .await
            .unwrap();
        queue
            .push(Job::BroadcastRelease { version: "1.1".into() })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Job::BroadcastRelease { version: "1.0".into() }));
        assert_eq!(rx.recv().await, Some(Job::BroadcastRelease { version: "1.1".into() }));
    }

    #[tokio::test]
    async fn test_push_fails_without_worker() {
        let (queue, rx) = TaskQueue::new(1);
        drop(rx);
        assert!(queue
            .push(Job::BroadcastRelease { version: "1.0".into() })
            .await
            .is_err());
    }

    #[test]
    fn test_format_release_note() {
        assert_eq!(
            format_release_note("1.2", "Reports <beta>"),
            "🚀 <b>What's new in 1.2</b>\n\nReports &lt;beta&gt;"
        );
    }
}
