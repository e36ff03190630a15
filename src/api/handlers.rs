use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teloxide::types::{ChatId, UserId};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::error::{bad_request, internal, not_found, ApiError};
use crate::db::templates::normalize_template_name;
use crate::db::{PunishmentRecord, ReleaseNote, Template};
use crate::tasks::Job;
use crate::AppContext;

const MAX_TOP: usize = 50;
const DEFAULT_NOTES: usize = 20;
const MAX_NOTES: usize = 100;
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub day: Option<NaiveDate>,
    pub top: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub version: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct PunishmentsView {
    pub chat_id: i64,
    pub user_id: u64,
    pub level: u32,
    pub ladder_len: usize,
    pub history: Vec<PunishmentRecord>,
}

pub async fn list_chats(ctx: Arc<AppContext>) -> Result<impl Reply, Rejection> {
    let chats = ctx.db.list_chats().await.map_err(internal)?;
    Ok(warp::reply::json(&chats))
}

pub async fn chat_stats(
    chat_id: i64,
    query: StatsQuery,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let chat = ChatId(chat_id);
    if ctx.db.get_chat(chat).await.map_err(internal)?.is_none() {
        return Err(not_found(format!("Chat {}", chat_id)));
    }
    let day = query.day.unwrap_or_else(|| ctx.today());
    let top = query
        .top
        .unwrap_or(ctx.settings.report_top_n)
        .min(MAX_TOP);
    let stats = ctx.db.day_stats(chat, day, top).await.map_err(internal)?;
    Ok(warp::reply::json(&stats))
}

pub async fn user_punishments(
    chat_id: i64,
    user_id: u64,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let (chat, user) = (ChatId(chat_id), UserId(user_id));
    let level = ctx.punishments.level(chat, user).await.map_err(internal)?;
    let history = ctx
        .db
        .history(chat, user, HISTORY_LIMIT)
        .await
        .map_err(internal)?;
    Ok(warp::reply::json(&PunishmentsView {
        chat_id,
        user_id,
        level,
        ladder_len: ctx.punishments.ladder().len(),
        history,
    }))
}

pub async fn list_templates(ctx: Arc<AppContext>) -> Result<impl Reply, Rejection> {
    let templates = ctx.db.list_templates().await.map_err(internal)?;
    Ok(warp::reply::json(&templates))
}

pub async fn get_template(name: String, ctx: Arc<AppContext>) -> Result<impl Reply, Rejection> {
    let name = normalize_template_name(&name).map_err(bad_request)?;
    match ctx.db.get_template(&name).await.map_err(internal)? {
        Some(template) => Ok(warp::reply::json(&template)),
        None => Err(not_found(format!("Template {}", name))),
    }
}

pub async fn put_template(
    name: String,
    body: TemplateBody,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let template = Template::new(&name, &body.text, None).map_err(bad_request)?;
    ctx.db.save_template(&template).await.map_err(internal)?;
    log::info!("Template {} saved through the API", template.name);
    Ok(warp::reply::json(&template))
}

pub async fn delete_template(name: String, ctx: Arc<AppContext>) -> Result<impl Reply, Rejection> {
    let name = normalize_template_name(&name).map_err(bad_request)?;
    if !ctx.db.delete_template(&name).await.map_err(internal)? {
        return Err(not_found(format!("Template {}", name)));
    }
    log::info!("Template {} deleted through the API", name);
    Ok(StatusCode::NO_CONTENT)
}

fn notes_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_NOTES).min(MAX_NOTES)
}

pub async fn list_release_notes(
    query: NotesQuery,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let notes = ctx
        .db
        .list_release_notes(notes_limit(query.limit))
        .await
        .map_err(internal)?;
    Ok(warp::reply::json(&notes))
}

pub async fn create_release_note(
    body: ReleaseBody,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let note = ReleaseNote::new(&body.version, &body.text).map_err(bad_request)?;
    if !ctx.db.add_release_note(&note).await.map_err(internal)? {
        return Err(warp::reject::custom(ApiError::Conflict(format!(
            "Release {} already exists",
            note.version
        ))));
    }
    ctx.queue
        .push(Job::BroadcastRelease {
            version: note.version.clone(),
        })
        .await
        .map_err(internal)?;
    log::info!("Release {} published through the API", note.version);
    Ok(warp::reply::with_status(
        warp::reply::json(&note),
        StatusCode::CREATED,
    ))
}
