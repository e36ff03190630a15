use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use teloxide::utils::html;

use super::Db;
use crate::config::key;

static TEMPLATE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,32}$").expect("valid template name regex"));

/// A canned text admins can send with `/template <name>`.
///
/// `{user}` and `{chat}` in the text are replaced when the template is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub text: String,
    pub created_by: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(name: &str, text: &str, created_by: Option<u64>) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("Template text must not be empty"));
        }
        Ok(Template {
            name: normalize_template_name(name)?,
            text: text.to_string(),
            created_by,
            created_at: Utc::now(),
        })
    }

    /// HTML for a message: the text is escaped, then the placeholders are
    /// replaced by `user` and `chat`, which must already be HTML.
    pub fn render(&self, user: &str, chat: &str) -> String {
        html::escape(&self.text)
            .replace("{user}", user)
            .replace("{chat}", chat)
    }
}

/// Lower-case the name and check it is 1-32 characters of `a-z 0-9 _ -`.
pub fn normalize_template_name(raw: &str) -> Result<String> {
    let name = raw.trim().to_lowercase();
    if TEMPLATE_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(anyhow!(
            "Invalid template name {:?}: use 1-32 characters from a-z, 0-9, '_' and '-'",
            raw.trim()
        ))
    }
}

impl Db {
    /// Create or replace a template.
    pub async fn save_template(&self, template: &Template) -> Result<()> {
        let mut conn = self.conn().await?;
        let data = serde_json::to_string(template)?;
        let _: () = conn.hset(key::TEMPLATES, &template.name, data).await?;
        Ok(())
    }

    pub async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        let name = match normalize_template_name(name) {
            Ok(name) => name,
            Err(_) => return Ok(None),
        };
        let mut conn = self.conn().await?;
        let data: Option<String> = conn.hget(key::TEMPLATES, name).await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// All templates sorted by name.
    pub async fn list_templates(&self) -> Result<Vec<Template>> {
        let mut conn = self.conn().await?;
        let all: HashMap<String, String> = conn.hgetall(key::TEMPLATES).await?;
        let mut templates = Vec::with_capacity(all.len());
        for (name, data) in all {
            match serde_json::from_str::<Template>(&data) {
                Ok(template) => templates.push(template),
                Err(e) => log::warn!("Skipping unreadable template {}: {}", name, e),
            }
        }
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    /// Returns whether a template was deleted.
    pub async fn delete_template(&self, name: &str) -> Result<bool> {
        let name = match normalize_template_name(name) {
            Ok(name) => name,
            Err(_) => return Ok(false),
        };
        let mut conn = self.conn().await?;
        let removed: i64 = conn.hdel(key::TEMPLATES, name).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_template_name() {
        assert_eq!(normalize_template_name(" Rules ").unwrap(), "rules");
        assert_eq!(normalize_template_name("no-spam_2").unwrap(), "no-spam_2");
        assert!(normalize_template_name("").is_err());
        assert!(normalize_template_name("has space").is_err());
        assert!(normalize_template_name("правила").is_err());
        assert!(normalize_template_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_new_template_validates() {
        assert!(Template::new("rules", "   ", None).is_err());
        let template = Template::new("Rules", "  Be nice  ", Some(1)).unwrap();
        assert_eq!(template.name, "rules");
        assert_eq!(template.text, "Be nice");
        assert_eq!(template.created_by, Some(1));
    }

    #[test]
    fn test_render() {
        let template = Template::new("hello", "Welcome to {chat}, {user}! {user}, read the rules.", None).unwrap();
        assert_eq!(
            template.render("Ada", "Rustaceans"),
            "Welcome to Rustaceans, Ada! Ada, read the rules."
        );
    }

    #[test]
    fn test_render_escapes_text_but_not_placeholders() {
        let template = Template::new("rules", "Members < 18 & bots are banned, {user}", None).unwrap();
        assert_eq!(
            template.render("<a href=\"tg://user?id=1\">Ada</a>", "Rust"),
            "Members &lt; 18 &amp; bots are banned, <a href=\"tg://user?id=1\">Ada</a>"
        );
    }
}
