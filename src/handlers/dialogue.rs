//! Multi-step input: new templates and new release notes.
//!
//! Dialogues are kept per chat. Each state remembers who started it so that
//! other members talking in the same group are not mistaken for answers.

use std::sync::Arc;
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::prelude::*;
use teloxide::types::UserId;
use teloxide::utils::html;

use super::{reply_html, HandlerResult};
use crate::db::release_notes::validate_version;
use crate::db::templates::normalize_template_name;
use crate::db::{ReleaseNote, Template};
use crate::tasks::Job;
use crate::AppContext;

pub type MyDialogue = Dialogue<State, InMemStorage<State>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum State {
    #[default]
    Idle,
    TemplateName {
        author: UserId,
    },
    TemplateText {
        author: UserId,
        name: String,
    },
    ReleaseVersion {
        author: UserId,
    },
    ReleaseText {
        author: UserId,
        version: String,
    },
}

impl State {
    /// The user the dialogue is waiting for.
    pub fn author(&self) -> Option<UserId> {
        match self {
            State::Idle => None,
            State::TemplateName { author }
            | State::TemplateText { author, .. }
            | State::ReleaseVersion { author }
            | State::ReleaseText { author, .. } => Some(*author),
        }
    }
}

pub async fn handle_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    state: State,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default().trim().to_string();
    if text.is_empty() {
        reply_html(&bot, &msg, "Please send text, or /cancel.").await?;
        return Ok(());
    }

    match state {
        State::Idle => {}
        State::TemplateName { author } => match normalize_template_name(&text) {
            Ok(name) => {
                let verb = if ctx.db.get_template(&name).await?.is_some() {
                    "replace"
                } else {
                    "create"
                };
                reply_html(
                    &bot,
                    &msg,
                    format!(
                        "Send the text to {} <b>{}</b> with. You can use {{user}} and {{chat}}.",
                        verb,
                        html::escape(&name)
                    ),
                )
                .await?;
                dialogue.update(State::TemplateText { author, name }).await?;
            }
            Err(e) => {
                reply_html(&bot, &msg, html::escape(&e.to_string())).await?;
            }
        },
        State::TemplateText { author, name } => {
            let template = Template::new(&name, &text, Some(author.0))?;
            ctx.db.save_template(&template).await?;
            log::info!("Template {} saved by user {}", name, author);
            reply_html(&bot, &msg, format!("Template <b>{}</b> saved.", html::escape(&name)))
                .await?;
            dialogue.exit().await?;
        }
        State::ReleaseVersion { author } => match validate_version(&text) {
            Ok(version) => {
                if ctx.db.get_release_note(&version).await?.is_some() {
                    reply_html(
                        &bot,
                        &msg,
                        format!(
                            "Release {} already exists. Send another version, or /cancel.",
                            html::escape(&version)
                        ),
                    )
                    .await?;
                    return Ok(());
                }
                reply_html(&bot, &msg, "Now send the release notes text.").await?;
                dialogue.update(State::ReleaseText { author, version }).await?;
            }
            Err(e) => {
                reply_html(&bot, &msg, html::escape(&e.to_string())).await?;
            }
        },
        State::ReleaseText { author, version } => {
            let note = ReleaseNote::new(&version, &text)?;
            if !ctx.db.add_release_note(&note).await? {
                reply_html(&bot, &msg, "This release was published in the meantime.").await?;
                dialogue.exit().await?;
                return Ok(());
            }
            ctx.queue
                .push(Job::BroadcastRelease {
                    version: note.version.clone(),
                })
                .await?;
            log::info!("Release {} published by user {}", note.version, author);
            reply_html(
                &bot,
                &msg,
                format!(
                    "Release {} saved. Announcing it in all groups.",
                    html::escape(&note.version)
                ),
            )
            .await?;
            dialogue.exit().await?;
        }
    }
    Ok(())
}
