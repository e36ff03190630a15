mod common;

use chat_moderator_bot::antibot::{handle_new_members, handle_verify_press, PressOutcome};
use chat_moderator_bot::config::Settings;
use chat_moderator_bot::db::{Db, ReleaseNote, Verification};
use chat_moderator_bot::handlers::admin::protected;
use chat_moderator_bot::tasks::{broadcast_release, TaskQueue};
use chat_moderator_bot::AppContext;
use chrono::{Duration, Utc};
use common::{fake_bot, group_json, user_json};
use serde_json::{json, Value};
use serial_test::serial;
use teloxide::types::{Chat, ChatId, ChatPermissions, User, UserId};

const BOT_ID: u64 = 999;

fn context() -> AppContext {
    let settings = Settings::from_lookup(|name| match name {
        "BOT_TOKEN" => Some("123:test".to_string()),
        _ => None,
    })
    .unwrap();
    let db = Db::open(&settings.redis_url).unwrap();
    let (queue, _jobs) = TaskQueue::new(8);
    AppContext::new(db, settings, queue)
}

fn group(id: i64) -> Chat {
    serde_json::from_value(group_json(id, "Rustaceans")).unwrap()
}

fn user(id: u64, name: &str) -> User {
    serde_json::from_value(user_json(id, name)).unwrap()
}

fn permissions(params: &Value) -> ChatPermissions {
    serde_json::from_value(params["permissions"].clone()).unwrap()
}

#[tokio::test]
async fn test_bot_and_admins_are_protected() {
    let (bot, _calls) = fake_bot(|method, params| match method {
        "getMe" => {
            let mut me = user_json(BOT_ID, "Moderator");
            me["is_bot"] = json!(true);
            me["username"] = json!("moderator_bot");
            me["can_join_groups"] = json!(true);
            me["can_read_all_group_messages"] = json!(true);
            me["supports_inline_queries"] = json!(false);
            Some(me)
        }
        "getChatMember" => {
            let id = params["user_id"].as_u64()?;
            let status = if id == 5 { "creator" } else { "member" };
            Some(json!({
                "user": user_json(id, "Someone"),
                "status": status,
                "is_anonymous": false
            }))
        }
        _ => None,
    });
    let chat = group(-100);

    assert_eq!(
        protected(&bot, &chat, UserId(BOT_ID)).await.unwrap(),
        Some("I will not punish myself.")
    );
    assert_eq!(
        protected(&bot, &chat, UserId(5)).await.unwrap(),
        Some("Admins cannot be punished.")
    );
    assert_eq!(protected(&bot, &chat, UserId(6)).await.unwrap(), None);
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_failed_challenge_lifts_restriction() -> anyhow::Result<()> {
    let ctx = context();
    let chat = group(-990_600);
    let newcomer = user(990_601, "Ada");
    ctx.db.set_antibot(chat.id, true).await?;
    ctx.db.remove_verification(chat.id, newcomer.id).await?;

    // Restricting works, sending the challenge does not.
    let (bot, calls) = fake_bot(|method, _| match method {
        "restrictChatMember" => Some(json!(true)),
        _ => None,
    });
    handle_new_members(&bot, &ctx, &chat, &[newcomer.clone()], Utc::now()).await?;

    assert_eq!(
        calls.methods(),
        ["restrictChatMember", "sendMessage", "restrictChatMember"]
    );
    let restrictions = calls.of("restrictChatMember");
    assert_eq!(permissions(&restrictions[0]), ChatPermissions::empty());
    assert_eq!(permissions(&restrictions[1]), ChatPermissions::all());
    assert_eq!(ctx.db.get_verification(chat.id, newcomer.id).await?, None);

    ctx.db.set_antibot(chat.id, false).await?;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_failed_unrestrict_keeps_verification() -> anyhow::Result<()> {
    let ctx = context();
    let chat = group(-990_700);
    let newcomer = user(990_701, "Ada");
    let verification = Verification {
        chat_id: chat.id.0,
        user_id: newcomer.id.0,
        message_id: 10,
        deadline: Utc::now() + Duration::minutes(5),
    };
    ctx.db.add_verification(&verification).await?;

    let (bot, _calls) = fake_bot(|_, _| None);
    assert!(handle_verify_press(&bot, &ctx, &chat, &newcomer, newcomer.id)
        .await
        .is_err());
    // Still pending, so the user can press again.
    assert_eq!(
        ctx.db.get_verification(chat.id, newcomer.id).await?,
        Some(verification)
    );

    ctx.db.remove_verification(chat.id, newcomer.id).await?;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_press_after_deadline_is_stale() -> anyhow::Result<()> {
    let ctx = context();
    let chat = group(-990_800);
    let newcomer = user(990_801, "Ada");
    let verification = Verification {
        chat_id: chat.id.0,
        user_id: newcomer.id.0,
        message_id: 10,
        deadline: Utc::now() - Duration::seconds(1),
    };
    ctx.db.add_verification(&verification).await?;

    let (bot, calls) = fake_bot(|_, _| Some(json!(true)));
    let outcome = handle_verify_press(&bot, &ctx, &chat, &newcomer, newcomer.id).await?;
    assert_eq!(outcome, PressOutcome::Stale);
    assert!(calls.all().is_empty());
    // Left for the sweeper to kick.
    assert!(ctx.db.get_verification(chat.id, newcomer.id).await?.is_some());

    ctx.db.remove_verification(chat.id, newcomer.id).await?;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "needs a Redis server at 127.0.0.1"]
async fn test_broadcast_skips_chats_that_saw_the_release() -> anyhow::Result<()> {
    let ctx = context();
    let version = format!("it-{}", Utc::now().timestamp_millis());
    ctx.db
        .add_release_note(&ReleaseNote::new(&version, "Daily reports")?)
        .await?;
    let (seen, fresh) = (group(-990_900), group(-990_901));
    ctx.db.upsert_chat(&seen).await?;
    ctx.db.upsert_chat(&fresh).await?;
    ctx.db.set_last_release(seen.id, &version).await?;

    // Sends fail, so nothing is marked as announced.
    let (bot, calls) = fake_bot(|_, _| None);
    assert_eq!(broadcast_release(&bot, &ctx, &version).await?, 0);

    let targets: Vec<ChatId> = calls
        .of("sendMessage")
        .iter()
        .filter_map(|params| params["chat_id"].as_i64().map(ChatId))
        .collect();
    assert!(!targets.contains(&seen.id));
    assert!(targets.contains(&fresh.id));
    assert_eq!(ctx.db.last_release(fresh.id).await?, None);

    ctx.db.mark_left(seen.id).await?;
    ctx.db.mark_left(fresh.id).await?;
    Ok(())
}
