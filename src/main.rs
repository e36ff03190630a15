use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use teloxide::prelude::*;

use chat_moderator_bot::config::Settings;
use chat_moderator_bot::db::Db;
use chat_moderator_bot::tasks::TaskQueue;
use chat_moderator_bot::{antibot, api, handlers, migration, report, tasks, AppContext};

const QUEUE_CAPACITY: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "chat_moderator_bot=info");
    }
    pretty_env_logger::init();
    log::info!("Starting the chat moderator bot...");

    let settings = Settings::from_env()?;
    let db = Db::open(&settings.redis_url)?;
    migration::run(&db).await?;

    let bot = Bot::new(&settings.bot_token);
    if let Err(e) = handlers::setup_bot_commands(&bot).await {
        log::warn!("Could not register bot commands: {}", e);
    }

    let api_token = settings.api_token.clone();
    let (queue, jobs) = TaskQueue::new(QUEUE_CAPACITY);
    let ctx = Arc::new(AppContext::new(db, settings, queue));

    tokio::spawn(tasks::run_worker(bot.clone(), ctx.clone(), jobs));
    tokio::spawn(report::run_scheduler(ctx.clone()));
    tokio::spawn(antibot::run_sweeper(bot.clone(), ctx.clone()));
    tokio::spawn(ctx.punishments.clone().start_decay_loop());

    match api_token {
        Some(token) => {
            tokio::spawn(api::serve(ctx.clone(), token));
        }
        None => log::info!("API_TOKEN is not set, HTTP API disabled"),
    }

    handlers::run_dispatcher(bot, ctx).await;
    Ok(())
}
