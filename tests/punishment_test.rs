use chat_moderator_bot::config::DEFAULT_LADDER;
use chat_moderator_bot::db::Db;
use chat_moderator_bot::punishment::{PunishmentKind, PunishmentManager};
use chrono::{Duration as ChronoDuration, Utc};
use serial_test::serial;
use std::time::Duration;
use teloxide::types::{ChatId, UserId};

const REDIS_URL: &str = "redis://127.0.0.1/";
const CHAT: ChatId = ChatId(-990_001);
const USER: UserId = UserId(990_001);
const ADMIN: UserId = UserId(1);

fn manager(db: &Db) -> PunishmentManager {
    PunishmentManager::new(
        db.clone(),
        DEFAULT_LADDER.parse().unwrap(),
        Duration::from_secs(3600),
    )
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_ladder_escalation() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let manager = manager(&db);
    manager.amnesty(CHAT, USER).await?;
    let now = Utc::now();
    let day = now.date_naive();

    // Two warnings, then the first mute.
    for expected_level in 1..=2 {
        let applied = manager
            .escalate(CHAT, USER, ADMIN, Some("flood".into()), now, day)
            .await?;
        assert_eq!(applied.record.kind, PunishmentKind::Warn);
        assert_eq!(applied.level, expected_level);
    }
    let kind = manager.next_step(CHAT, USER).await?;
    assert_eq!(kind, PunishmentKind::Mute { seconds: 3600 });
    let applied = manager.punish(CHAT, USER, kind, ADMIN, None, now, day).await?;
    assert_eq!(applied.level, 3);
    assert_eq!(applied.record.until, Some(now + ChronoDuration::hours(1)));

    // An explicit ban goes to the end, and the ladder keeps repeating it.
    let applied = manager
        .punish(CHAT, USER, PunishmentKind::Ban, ADMIN, None, now, day)
        .await?;
    assert_eq!(applied.level, 5);
    assert_eq!(manager.next_step(CHAT, USER).await?, PunishmentKind::Ban);

    // Lifting a ban is recorded but does not change the level.
    let applied = manager
        .punish(CHAT, USER, PunishmentKind::Unban, ADMIN, None, now, day)
        .await?;
    assert_eq!(applied.level, 5);

    let history = db.history(CHAT, USER, 10).await?;
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].kind, PunishmentKind::Unban);
    assert_eq!(history[4].reason.as_deref(), Some("flood"));

    manager.amnesty(CHAT, USER).await?;
    assert_eq!(manager.level(CHAT, USER).await?, 0);
    assert!(db.history(CHAT, USER, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_levels_decay_after_quiet_time() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let manager = manager(&db);
    manager.amnesty(CHAT, USER).await?;
    let now = Utc::now();

    db.set_level(CHAT, USER, 3, now - ChronoDuration::hours(2)).await?;
    assert!(manager.decay_levels(now).await? >= 1);
    assert_eq!(manager.level(CHAT, USER).await?, 2);
    assert_eq!(db.level_state(CHAT, USER).await?, Some((2, now.timestamp())));

    // Just lowered, so not a candidate again yet.
    manager.decay_levels(now).await?;
    assert_eq!(manager.level(CHAT, USER).await?, 2);

    // Reaching zero drops the user from the decay index.
    db.set_level(CHAT, USER, 1, now - ChronoDuration::hours(2)).await?;
    manager.decay_levels(now).await?;
    assert_eq!(manager.level(CHAT, USER).await?, 0);
    assert!(!db
        .decay_candidates(now + ChronoDuration::days(1))
        .await?
        .contains(&(CHAT, USER)));

    manager.amnesty(CHAT, USER).await?;
    Ok(())
}
