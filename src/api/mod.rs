//! HTTP backend for dashboards and operators. Everything under `/api` needs
//! the bearer token from `API_TOKEN`.

pub mod auth;
pub mod error;
pub mod handlers;

use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::AppContext;

const MAX_BODY: u64 = 64 * 1024;

fn with_ctx(
    ctx: Arc<AppContext>,
) -> impl Filter<Extract = (Arc<AppContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY).and(warp::body::json())
}

/// All routes, with rejections rendered as JSON.
pub fn routes(
    ctx: Arc<AppContext>,
    token: &str,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let chats = warp::path!("chats")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::list_chats);

    let chat_stats = warp::path!("chats" / i64 / "stats")
        .and(warp::get())
        .and(warp::query::<handlers::StatsQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::chat_stats);

    let punishments = warp::path!("chats" / i64 / "users" / u64 / "punishments")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::user_punishments);

    let templates = warp::path!("templates")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::list_templates);

    let get_template = warp::path!("templates" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::get_template);

    let put_template = warp::path!("templates" / String)
        .and(warp::put())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::put_template);

    let delete_template = warp::path!("templates" / String)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::delete_template);

    let release_notes = warp::path!("release-notes")
        .and(warp::get())
        .and(warp::query::<handlers::NotesQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(handlers::list_release_notes);

    let create_release = warp::path!("release-notes")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx))
        .and_then(handlers::create_release_note);

    let api = warp::path("api")
        .and(auth::require_token(Arc::from(token)))
        .and(
            chats
                .or(chat_stats)
                .or(punishments)
                .or(templates)
                .or(get_template)
                .or(put_template)
                .or(delete_template)
                .or(release_notes)
                .or(create_release),
        );

    health
        .or(api)
        .recover(error::handle_rejection)
        .with(warp::log("chat_moderator_bot::api"))
}

pub async fn serve(ctx: Arc<AppContext>, token: String) {
    let addr = ctx.settings.api_addr;
    log::info!("HTTP API listening on {}", addr);
    warp::serve(routes(ctx, &token)).run(addr).await;
}
