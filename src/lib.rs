pub mod config;
pub mod db;
pub mod migration;
pub mod punishment;
pub mod antibot;
pub mod report;
pub mod tasks;
pub mod keyboards;
pub mod handlers;
pub mod api;

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::config::Settings;
use crate::db::Db;
use crate::punishment::PunishmentManager;
use crate::tasks::TaskQueue;

/// Everything the bot handlers, the HTTP API and the background loops share.
pub struct AppContext {
    pub db: Db,
    pub settings: Arc<Settings>,
    pub queue: TaskQueue,
    pub punishments: PunishmentManager,
}

impl AppContext {
    pub fn new(db: Db, settings: Settings, queue: TaskQueue) -> Self {
        let settings = Arc::new(settings);
        let punishments = PunishmentManager::new(
            db.clone(),
            settings.ladder.clone(),
            settings.punishment_decay,
        );
        AppContext {
            db,
            settings,
            queue,
            punishments,
        }
    }

    /// Today's date in the configured time zone.
    pub fn today(&self) -> NaiveDate {
        report::local_day(Utc::now(), self.settings.local_offset())
    }
}
