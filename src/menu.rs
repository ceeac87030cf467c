//! src/menu.rs
//! Menu ustawień w DM: GroupSelect -> ActionSelect -> {toggle, LanguageSelect, wpisywanie ID}.
//!
//! Cały kontekst siedzi w tokenie przycisku; jedyny stan po stronie serwera to
//! jednoslotowe "czekam na ID gildii" per user (nowszy prompt nadpisuje starszy,
//! nieodebrany wygasa po `INPUT_TTL`).
//! Każde przejście sprawdza uprawnienia do gildii wskazanej w tokenie.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::callback::{Callback, GroupRef, MenuAction};
use crate::i18n;
use crate::platform::{Button, InteractionRef, Keyboard, MessageRef, Platform, Target};
use crate::policy::{GroupPolicy, GroupRegistry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupIdInputError {
    #[error("empty group id")]
    Empty,
    #[error("`{0}` is not a numeric group id")]
    NotNumeric(String),
}

/// Akceptuje same cyfry (po obcięciu białych znaków); 0 to nie jest ID.
pub fn parse_group_id(input: &str) -> Result<u64, GroupIdInputError> {
    let t = input.trim();
    if t.is_empty() {
        return Err(GroupIdInputError::Empty);
    }
    if !t.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GroupIdInputError::NotNumeric(t.to_string()));
    }
    match t.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(GroupIdInputError::NotNumeric(t.to_string())),
    }
}

/// Jak długo czekamy na wpisanie ID po kliknięciu "wpisz ID".
pub const INPUT_TTL: Duration = Duration::from_secs(10 * 60);

/// Slot "czekam na ID": wiadomość menu, którą potem podmieniamy (jeśli jest).
#[derive(Debug, Clone, Copy)]
struct PendingInput {
    menu: Option<MessageRef>,
    expires_at: Instant,
}

impl PendingInput {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

pub struct SettingsMenu {
    registry: Arc<GroupRegistry>,
    platform: Arc<dyn Platform>,
    pending: DashMap<u64, PendingInput>,
}

impl SettingsMenu {
    pub fn new(registry: Arc<GroupRegistry>, platform: Arc<dyn Platform>) -> Self {
        Self {
            registry,
            platform,
            pending: DashMap::new(),
        }
    }

    pub fn is_awaiting_input(&self, user_id: u64) -> bool {
        let now = Instant::now();
        self.pending.get(&user_id).is_some_and(|p| p.is_live(now))
    }

    /// Usuwa przeterminowane sloty; zwraca ile ich było.
    pub fn sweep_pending(&self) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|_, p| p.is_live(now));
        before.saturating_sub(self.pending.len())
    }

    /// `/settings`: nowa wiadomość z listą gildii w DM.
    pub async fn open(&self, user_id: u64) -> anyhow::Result<MessageRef> {
        let (text, kb) = self.group_select(user_id).await;
        self.platform.send_message(Target::User(user_id), &text, kb).await
    }

    /// Obsługa tokenów menu (`group:`, `action:`, `lang:`).
    pub async fn on_callback(
        &self,
        interaction: &InteractionRef,
        user_id: u64,
        message: Option<MessageRef>,
        cb: Callback,
    ) {
        match cb {
            Callback::Group(GroupRef::Input) => {
                self.answer(interaction, "", false).await;
                self.arm_input(user_id, message).await;
            }
            Callback::Group(GroupRef::Id(gid)) => {
                let Some(policy) = self.authorize(interaction, gid, user_id).await else {
                    return;
                };
                self.answer(interaction, "", false).await;
                let (text, kb) = action_select(&policy);
                self.render(user_id, message, &text, kb).await;
            }
            Callback::Action { group_id, action } => {
                self.on_action(interaction, user_id, message, group_id, action).await;
            }
            Callback::Lang { group_id, code } => {
                let Some(mut policy) = self.authorize(interaction, group_id, user_id).await else {
                    return;
                };
                if !i18n::is_supported(&code) {
                    self.answer(interaction, &i18n::translate(&policy.language, "menu_unknown_language"), true)
                        .await;
                    return;
                }
                policy.language = code;
                self.registry.update(policy.clone()).await;
                info!(gid = group_id, uid = user_id, lang = %policy.language, "group language changed");

                self.answer(interaction, &i18n::translate(&policy.language, "menu_saved"), false)
                    .await;
                let (text, kb) = action_select(&policy);
                self.render(user_id, message, &text, kb).await;
            }
            other => debug!(verb = other.verb(), "not a menu callback"),
        }
    }

    async fn on_action(
        &self,
        interaction: &InteractionRef,
        user_id: u64,
        message: Option<MessageRef>,
        group_id: u64,
        action: MenuAction,
    ) {
        let Some(mut policy) = self.authorize(interaction, group_id, user_id).await else {
            return;
        };

        match action {
            MenuAction::Language => {
                self.answer(interaction, "", false).await;
                let (text, kb) = language_select(&policy);
                self.render(user_id, message, &text, kb).await;
            }
            MenuAction::Back => {
                self.answer(interaction, "", false).await;
                let (text, kb) = self.group_select(user_id).await;
                self.render(user_id, message, &text, kb).await;
            }
            toggle => {
                let Some(flag) = toggle_flag(&mut policy, toggle) else {
                    return;
                };
                *flag = !*flag;
                let value = *flag;
                self.registry.update(policy.clone()).await;
                info!(gid = group_id, uid = user_id, action = toggle.as_str(), value, "policy toggled");

                self.answer(interaction, &i18n::translate(&policy.language, "menu_saved"), false)
                    .await;
                let (text, kb) = action_select(&policy);
                self.render(user_id, message, &text, kb).await;
            }
        }
    }

    /// Zwykły tekst w DM. `true` = zużyty przez slot "czekam na ID".
    pub async fn on_private_text(&self, user_id: u64, text: &str) -> bool {
        let Some(slot) = self.pending.get(&user_id).map(|p| *p) else {
            return false;
        };
        if !slot.is_live(Instant::now()) {
            self.pending.remove(&user_id);
            debug!(uid = user_id, "group id prompt expired");
            return false;
        }

        let group_id = match parse_group_id(text) {
            Ok(id) => id,
            Err(e) => {
                debug!(uid = user_id, error = %e, "group id input rejected");
                // slot zostaje uzbrojony
                self.send(user_id, &i18n::translate(i18n::DEFAULT_LANG, "prompt_group_id_invalid"), Vec::new())
                    .await;
                return true;
            }
        };
        self.pending.remove(&user_id);

        if !self.registry.is_group_admin(group_id, user_id).await {
            info!(gid = group_id, uid = user_id, "group id input denied – not a group admin");
            let lang = self.registry.language_of(group_id).await;
            self.send(user_id, &i18n::translate(&lang, "menu_denied"), Vec::new()).await;
            return true;
        }

        let policy = self.registry.claim_admin(group_id, user_id).await;
        let (text, kb) = action_select(&policy);
        self.render(user_id, slot.menu, &text, kb).await;
        true
    }

    /* ==============================
       Pomocnicze
       ============================== */

    async fn arm_input(&self, user_id: u64, menu: Option<MessageRef>) {
        let swept = self.sweep_pending();
        if swept > 0 {
            debug!(swept, "expired group id prompts dropped");
        }
        self.pending.insert(
            user_id,
            PendingInput {
                menu,
                expires_at: Instant::now() + INPUT_TTL,
            },
        );
        let text = i18n::translate(i18n::DEFAULT_LANG, "prompt_group_id");
        match menu {
            Some(msg) => {
                if let Err(e) = self.platform.edit_message(msg, &text, Vec::new()).await {
                    debug!(error=?e, uid = user_id, "edit to group id prompt failed – sending new");
                    self.send(user_id, &text, Vec::new()).await;
                }
            }
            None => self.send(user_id, &text, Vec::new()).await,
        }
    }

    /// Live-check uprawnień; przy odmowie od razu odpowiada na kliknięcie.
    /// Politykę (ewentualnie syntetyzowaną) dotykamy dopiero po pozytywnym sprawdzeniu.
    async fn authorize(&self, interaction: &InteractionRef, group_id: u64, user_id: u64) -> Option<GroupPolicy> {
        if !self.registry.is_group_admin(group_id, user_id).await {
            info!(gid = group_id, uid = user_id, "menu access denied");
            let lang = self.registry.language_of(group_id).await;
            self.answer(interaction, &i18n::translate(&lang, "menu_denied"), true).await;
            return None;
        }
        Some(self.registry.get(group_id).await)
    }

    async fn group_select(&self, user_id: u64) -> (String, Keyboard) {
        let groups = self.registry.groups_for_admin(user_id).await;
        let lang = groups
            .first()
            .map(|p| p.language.clone())
            .unwrap_or_else(|| i18n::DEFAULT_LANG.to_string());

        let text_key = if groups.is_empty() { "menu_no_groups" } else { "menu_groups" };
        let mut kb: Keyboard = groups
            .iter()
            .map(|p| vec![Button::new(p.display_name(), Callback::Group(GroupRef::Id(p.group_id)).to_string())])
            .collect();
        kb.push(vec![Button::new(
            i18n::translate(&lang, "btn_enter_group_id"),
            Callback::Group(GroupRef::Input).to_string(),
        )]);
        (i18n::translate(&lang, text_key), kb)
    }

    /// Podmienia wiadomość menu; gdy jej nie ma (albo edycja padła) – wysyła nową.
    async fn render(&self, user_id: u64, message: Option<MessageRef>, text: &str, kb: Keyboard) {
        if let Some(msg) = message {
            match self.platform.edit_message(msg, text, kb.clone()).await {
                Ok(()) => return,
                Err(e) => debug!(error=?e, uid = user_id, "menu edit failed – sending new"),
            }
        }
        self.send(user_id, text, kb).await;
    }

    async fn send(&self, user_id: u64, text: &str, kb: Keyboard) {
        if let Err(e) = self.platform.send_message(Target::User(user_id), text, kb).await {
            warn!(error=?e, uid = user_id, "menu DM failed");
        }
    }

    async fn answer(&self, interaction: &InteractionRef, text: &str, alert: bool) {
        if let Err(e) = self.platform.answer_interaction(interaction, text, alert).await {
            warn!(error=?e, "answer_interaction failed");
        }
    }
}

fn toggle_flag(policy: &mut GroupPolicy, action: MenuAction) -> Option<&mut bool> {
    Some(match action {
        MenuAction::TogglePremium => &mut policy.restrict_premium,
        MenuAction::ToggleEmoji => &mut policy.restrict_emoji_name,
        MenuAction::ToggleRandomUsername => &mut policy.restrict_random_username,
        MenuAction::ToggleBioLink => &mut policy.restrict_bio_link,
        MenuAction::ToggleReputation => &mut policy.use_reputation,
        MenuAction::ToggleNotify => &mut policy.notify_admin,
        MenuAction::Language | MenuAction::Back => return None,
    })
}

fn toggle_label_key(action: MenuAction) -> &'static str {
    match action {
        MenuAction::TogglePremium => "toggle_premium",
        MenuAction::ToggleEmoji => "toggle_emoji",
        MenuAction::ToggleRandomUsername => "toggle_random_username",
        MenuAction::ToggleBioLink => "toggle_bio_link",
        MenuAction::ToggleReputation => "toggle_cas",
        MenuAction::ToggleNotify => "toggle_notify",
        MenuAction::Language => "btn_language",
        MenuAction::Back => "btn_back",
    }
}

fn action_select(policy: &GroupPolicy) -> (String, Keyboard) {
    let lang = policy.language.as_str();
    let gid = policy.group_id;
    let mut view = policy.clone();

    let mut kb: Keyboard = MenuAction::TOGGLES
        .iter()
        .map(|&action| {
            let on = toggle_flag(&mut view, action).is_some_and(|f| *f);
            let mark = if on { "✅" } else { "❌" };
            let label = format!("{mark} {}", i18n::translate(lang, toggle_label_key(action)));
            vec![Button::new(label, Callback::Action { group_id: gid, action }.to_string())]
        })
        .collect();
    kb.push(vec![
        Button::new(
            i18n::translate(lang, "btn_language"),
            Callback::Action { group_id: gid, action: MenuAction::Language }.to_string(),
        ),
        Button::new(
            i18n::translate(lang, "btn_back"),
            Callback::Action { group_id: gid, action: MenuAction::Back }.to_string(),
        ),
    ]);

    let group = policy.display_name();
    let text = i18n::translate_with(lang, "menu_actions", &[("group", group.as_str())]);
    (text, kb)
}

fn language_select(policy: &GroupPolicy) -> (String, Keyboard) {
    let lang = policy.language.as_str();
    let gid = policy.group_id;

    let mut kb: Keyboard = i18n::SUPPORTED
        .iter()
        .map(|(code, name)| {
            let label = if *code == lang { format!("• {name}") } else { name.to_string() };
            vec![Button::new(label, Callback::Lang { group_id: gid, code: code.to_string() }.to_string())]
        })
        .collect();
    kb.push(vec![Button::new(
        i18n::translate(lang, "btn_back"),
        Callback::Group(GroupRef::Id(gid)).to_string(),
    )]);

    let group = policy.display_name();
    let text = i18n::translate_with(lang, "menu_languages", &[("group", group.as_str())]);
    (text, kb)
}
