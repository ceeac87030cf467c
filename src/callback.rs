//! src/callback.rs
//! Tokeny callbacków (custom_id przycisków): `verb:arg1:arg2`.
//! Parsujemy raz do zamkniętego enuma, dalej już tylko `match`.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Akcje z ekranu ActionSelect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    TogglePremium,
    ToggleEmoji,
    ToggleRandomUsername,
    ToggleBioLink,
    ToggleReputation,
    ToggleNotify,
    Language,
    Back,
}

impl MenuAction {
    pub const TOGGLES: [MenuAction; 6] = [
        MenuAction::TogglePremium,
        MenuAction::ToggleEmoji,
        MenuAction::ToggleRandomUsername,
        MenuAction::ToggleBioLink,
        MenuAction::ToggleReputation,
        MenuAction::ToggleNotify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MenuAction::TogglePremium => "premium",
            MenuAction::ToggleEmoji => "emoji",
            MenuAction::ToggleRandomUsername => "random_username",
            MenuAction::ToggleBioLink => "bio_link",
            MenuAction::ToggleReputation => "cas",
            MenuAction::ToggleNotify => "notify",
            MenuAction::Language => "language",
            MenuAction::Back => "back",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "premium" => MenuAction::TogglePremium,
            "emoji" => MenuAction::ToggleEmoji,
            "random_username" => MenuAction::ToggleRandomUsername,
            "bio_link" => MenuAction::ToggleBioLink,
            "cas" => MenuAction::ToggleReputation,
            "notify" => MenuAction::ToggleNotify,
            "language" => MenuAction::Language,
            "back" => MenuAction::Back,
            _ => return None,
        })
    }
}

/// Wybór gildii: konkretne id albo "wpiszę ręcznie".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRef {
    Id(u64),
    Input,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Unban { group_id: u64, user_id: u64 },
    SelfUnban { group_id: u64, user_id: u64 },
    Group(GroupRef),
    Action { group_id: u64, action: MenuAction },
    Lang { group_id: u64, code: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// Obcy token (np. innego modułu) – ignorujemy po cichu.
    #[error("unknown callback verb `{0}`")]
    UnknownVerb(String),
    /// Znany czasownik, ale argumenty się nie zgadzają.
    #[error("malformed `{verb}` callback: {detail}")]
    Malformed { verb: &'static str, detail: String },
}

fn malformed(verb: &'static str, detail: impl Into<String>) -> CallbackError {
    CallbackError::Malformed {
        verb,
        detail: detail.into(),
    }
}

fn parse_id(verb: &'static str, field: Option<&str>, what: &str) -> Result<u64, CallbackError> {
    let raw = field.ok_or_else(|| malformed(verb, format!("missing {what}")))?;
    raw.parse::<u64>()
        .map_err(|_| malformed(verb, format!("bad {what} `{raw}`")))
}

impl FromStr for Callback {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let verb = parts.next().unwrap_or_default();

        let cb = match verb {
            "unban" => Callback::Unban {
                group_id: parse_id("unban", parts.next(), "group id")?,
                user_id: parse_id("unban", parts.next(), "user id")?,
            },
            "self_unban" => Callback::SelfUnban {
                group_id: parse_id("self_unban", parts.next(), "group id")?,
                user_id: parse_id("self_unban", parts.next(), "user id")?,
            },
            "group" => match parts.next() {
                Some("input") => Callback::Group(GroupRef::Input),
                other => Callback::Group(GroupRef::Id(parse_id("group", other, "group id")?)),
            },
            "action" => {
                let group_id = parse_id("action", parts.next(), "group id")?;
                let raw = parts.next().ok_or_else(|| malformed("action", "missing action"))?;
                let action = MenuAction::parse(raw)
                    .ok_or_else(|| malformed("action", format!("unknown action `{raw}`")))?;
                Callback::Action { group_id, action }
            }
            "lang" => {
                let group_id = parse_id("lang", parts.next(), "group id")?;
                let code = parts
                    .next()
                    .filter(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphabetic()))
                    .ok_or_else(|| malformed("lang", "missing language code"))?;
                Callback::Lang {
                    group_id,
                    code: code.to_ascii_lowercase(),
                }
            }
            other => return Err(CallbackError::UnknownVerb(other.to_string())),
        };

        if parts.next().is_some() {
            return Err(malformed(cb.verb(), "trailing fields"));
        }
        Ok(cb)
    }
}

impl Callback {
    pub fn verb(&self) -> &'static str {
        match self {
            Callback::Unban { .. } => "unban",
            Callback::SelfUnban { .. } => "self_unban",
            Callback::Group(_) => "group",
            Callback::Action { .. } => "action",
            Callback::Lang { .. } => "lang",
        }
    }

    /// Gildia, której dotyczy token (do autoryzacji).
    pub fn group_id(&self) -> Option<u64> {
        match self {
            Callback::Unban { group_id, .. }
            | Callback::SelfUnban { group_id, .. }
            | Callback::Action { group_id, .. }
            | Callback::Lang { group_id, .. } => Some(*group_id),
            Callback::Group(GroupRef::Id(id)) => Some(*id),
            Callback::Group(GroupRef::Input) => None,
        }
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Unban { group_id, user_id } => write!(f, "unban:{group_id}:{user_id}"),
            Callback::SelfUnban { group_id, user_id } => write!(f, "self_unban:{group_id}:{user_id}"),
            Callback::Group(GroupRef::Id(id)) => write!(f, "group:{id}"),
            Callback::Group(GroupRef::Input) => write!(f, "group:input"),
            Callback::Action { group_id, action } => write!(f, "action:{group_id}:{}", action.as_str()),
            Callback::Lang { group_id, code } => write!(f, "lang:{group_id}:{code}"),
        }
    }
}
