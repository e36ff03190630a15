//! Inline keyboards and the callback data their buttons carry.

use std::fmt;
use std::str::FromStr;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, UserId};

use crate::db::Template;

/// Parsed `callback_data` of every button the bot sends.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackData {
    /// Antibot button bound to one newcomer.
    Verify(UserId),
    /// Send a template.
    Template(String),
    /// Refresh a punishment history listing.
    History(UserId),
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackData::Verify(user) => write!(f, "verify:{}", user.0),
            CallbackData::Template(name) => write!(f, "tpl:{}", name),
            CallbackData::History(user) => write!(f, "hist:{}", user.0),
        }
    }
}

impl FromStr for CallbackData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s.split_once(':').ok_or(())?;
        match prefix {
            "verify" => rest.parse().map(|id| CallbackData::Verify(UserId(id))).map_err(|_| ()),
            "hist" => rest.parse().map(|id| CallbackData::History(UserId(id))).map_err(|_| ()),
            "tpl" if !rest.is_empty() => Ok(CallbackData::Template(rest.to_string())),
            _ => Err(()),
        }
    }
}

pub fn verify_keyboard(user: UserId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ I am not a bot",
        CallbackData::Verify(user).to_string(),
    )]])
}

/// Two templates per row.
pub fn templates_keyboard(templates: &[Template]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = templates
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|t| {
                    InlineKeyboardButton::callback(
                        t.name.clone(),
                        CallbackData::Template(t.name.clone()).to_string(),
                    )
                })
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn history_keyboard(user: UserId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔄 Refresh",
        CallbackData::History(user).to_string(),
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_callback_data_roundtrip() {
        for data in [
            CallbackData::Verify(UserId(42)),
            CallbackData::Template("rules".to_string()),
            CallbackData::History(UserId(7)),
        ] {
            assert_eq!(data.to_string().parse::<CallbackData>(), Ok(data));
        }
    }

    #[test]
    fn test_callback_data_rejects_garbage() {
        assert!("verify".parse::<CallbackData>().is_err());
        assert!("verify:abc".parse::<CallbackData>().is_err());
        assert!("tpl:".parse::<CallbackData>().is_err());
        assert!("other:1".parse::<CallbackData>().is_err());
    }

    #[test]
    fn test_templates_keyboard_layout() {
        let templates: Vec<Template> = ["a", "b", "c"]
            .iter()
            .map(|name| Template::new(name, "text", None).unwrap())
            .collect();
        let keyboard = templates_keyboard(&templates);
        let rows = &keyboard.inline_keyboard;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].len(), 1);
        assert_eq!(rows[1][0].text, "c");
        match &rows[1][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => assert_eq!(data, "tpl:c"),
            other => panic!("unexpected button {:?}", other),
        }
    }
}
