use chat_moderator_bot::config::{key, SCHEMA_VERSION};
use chat_moderator_bot::db::{Db, ReleaseNote, Template, Verification};
use chat_moderator_bot::migration;
use chrono::{Duration, NaiveDate, Utc};
use redis::AsyncCommands;
use serial_test::serial;
use teloxide::types::{ChatId, MessageId, UserId};

const REDIS_URL: &str = "redis://127.0.0.1/";

async fn clear_stats(db: &Db, chat: ChatId) -> anyhow::Result<()> {
    let mut conn = db.conn().await?;
    let keys: Vec<String> = conn
        .keys(format!("{}{}:*", key::TG_STATS_PREFIX, chat.0))
        .await?;
    if !keys.is_empty() {
        let _: () = conn.del(keys).await?;
    }
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_daily_stats() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let chat = ChatId(-990_100);
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let (ada, bob) = (UserId(990_101), UserId(990_102));
    clear_stats(&db, chat).await?;

    // Ada writes three messages, Bob one.
    for id in 1..=3 {
        db.record_message(chat, MessageId(id), ada, day).await?;
    }
    db.record_message(chat, MessageId(4), bob, day).await?;
    db.record_join(chat, day).await?;

    // Bob reacts twice to Ada, Ada reacts to herself (ignored).
    assert_eq!(db.record_reaction(chat, MessageId(1), bob, 2, day).await?, Some(ada));
    assert_eq!(db.record_reaction(chat, MessageId(1), ada, 1, day).await?, None);
    // Reactions to unknown messages are ignored.
    assert_eq!(db.record_reaction(chat, MessageId(999), bob, 1, day).await?, None);
    // Taking one back.
    db.record_reaction(chat, MessageId(1), bob, -1, day).await?;

    assert!(db.record_reply(chat, bob, ada, day).await?);
    assert!(!db.record_reply(chat, ada, ada, day).await?);

    let stats = db.day_stats(chat, day, 5).await?;
    assert_eq!(stats.messages, 4);
    assert_eq!(stats.active_users, 2);
    assert_eq!(stats.joined, 1);
    assert_eq!(stats.top_messages[0].user_id, ada.0);
    assert_eq!(stats.top_messages[0].count, 3);
    assert_eq!(stats.top_reactions.len(), 1);
    assert_eq!(stats.top_reactions[0].count, 1);
    assert_eq!(stats.top_replies[0].user_id, ada.0);

    let mine = db.user_stats(chat, ada, day).await?;
    assert_eq!(mine.messages, 3);
    assert_eq!(mine.reactions_received, 1);
    assert_eq!(mine.replies_received, 1);

    // Removing every reaction drops the member from the ranking.
    db.record_reaction(chat, MessageId(1), bob, -1, day).await?;
    assert!(db.day_stats(chat, day, 5).await?.top_reactions.is_empty());

    let other_day = db.day_stats(chat, day + Duration::days(1), 5).await?;
    assert!(other_day.is_empty());

    clear_stats(&db, chat).await?;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_templates() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    db.delete_template("it-greeting").await?;

    let template = Template::new("IT-Greeting", "Welcome {user} to {chat}!", Some(7))?;
    db.save_template(&template).await?;

    let stored = db.get_template("it-greeting").await?.unwrap();
    assert_eq!(stored.name, "it-greeting");
    assert_eq!(stored.render("Ada", "Rust"), "Welcome Ada to Rust!");
    assert!(db
        .list_templates()
        .await?
        .iter()
        .any(|t| t.name == "it-greeting"));

    assert!(db.delete_template("it-greeting").await?);
    assert!(!db.delete_template("it-greeting").await?);
    assert_eq!(db.get_template("it-greeting").await?, None);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_release_notes() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let version = format!("it-{}", Utc::now().timestamp_millis());
    let note = ReleaseNote::new(&version, "Daily reports")?;

    assert!(db.add_release_note(&note).await?);
    assert!(!db.add_release_note(&note).await?);
    assert_eq!(db.latest_release_note().await?, Some(note.clone()));

    let chat = ChatId(-990_200);
    db.set_last_release(chat, &version).await?;
    assert_eq!(db.last_release(chat).await?, Some(version.clone()));

    let mut conn = db.conn().await?;
    let _: () = conn.hdel(key::RELEASE_NOTES, &version).await?;
    let _: () = conn.zrem(key::RELEASE_ORDER, &version).await?;
    let _: () = conn.del(format!("{}{}", key::TG_CHATS_PREFIX, chat.0)).await?;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_verifications() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let now = Utc::now();
    let (chat, user) = (ChatId(-990_300), UserId(990_301));
    db.remove_verification(chat, user).await?;

    let verification = Verification {
        chat_id: chat.0,
        user_id: user.0,
        message_id: 10,
        deadline: now + Duration::seconds(60),
    };
    db.add_verification(&verification).await?;
    assert_eq!(db.get_verification(chat, user).await?, Some(verification.clone()));

    let pending = |list: Vec<Verification>| list.iter().any(|v| v.chat() == chat && v.user() == user);
    assert!(!pending(db.expired_verifications(now).await?));
    assert!(pending(db.expired_verifications(now + Duration::seconds(61)).await?));

    // Only the first removal wins.
    assert!(db.remove_verification(chat, user).await?);
    assert!(!db.remove_verification(chat, user).await?);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_migration_rebuilds_chat_index() -> anyhow::Result<()> {
    let db = Db::open(REDIS_URL)?;
    let chat = ChatId(-990_400);
    let chat_key = format!("{}{}", key::TG_CHATS_PREFIX, chat.0);

    let mut conn = db.conn().await?;
    let _: () = conn.hset(&chat_key, "title", "Migrated").await?;
    let _: () = conn.srem(key::TG_CHAT_INDEX, chat.0).await?;
    let _: () = conn.del(key::SCHEMA_VERSION).await?;

    assert_eq!(migration::run(&db).await?, 0);
    let indexed: bool = conn.sismember(key::TG_CHAT_INDEX, chat.0).await?;
    assert!(indexed);

    // Second run finds the current version and does nothing.
    assert_eq!(migration::run(&db).await?, SCHEMA_VERSION);

    let _: () = conn.del(&chat_key).await?;
    let _: () = conn.srem(key::TG_CHAT_INDEX, chat.0).await?;
    Ok(())
}
