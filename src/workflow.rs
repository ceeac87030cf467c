//! src/workflow.rs
//! Cykl życia ograniczenia: Unrestricted -> Restricted -> Unrestricted.
//!
//! Restrict (kolejno, best-effort – błąd kroku logujemy i idziemy dalej):
//!   usuń wiadomość -> DenyAll -> wpis w historii -> cache "zbanowany"
//!   -> DM do admina z przyciskiem `unban:` -> (powody naprawialne) notka z `self_unban:`.
//! Unban: przywrócenie uprawnień, dezaktywacja wpisu, usunięcie z cache. Idempotentny.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::callback::Callback;
use crate::classifier::{Classifier, Reason};
use crate::expiring::ExpiringSet;
use crate::i18n;
use crate::permissions::PermissionSet;
use crate::platform::{Button, InteractionRef, MessageRef, Platform, Profile, Target};
use crate::policy::{GroupPolicy, GroupRegistry};
use crate::store::{NewBanRecord, Store};

/// Zdarzenie do oceny: wejście do gildii (bez wiadomości) albo post na kanale.
#[derive(Debug, Clone)]
pub struct Incident {
    pub group_id: u64,
    pub profile: Profile,
    pub message: Option<MessageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nie oceniano (brak uprawnień moderatora, admin, świeżo zbanowany…).
    Skipped,
    Allowed,
    Restricted(Reason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbanOutcome {
    Lifted,
    /// Nic do zdjęcia – no-op, ale wołający i tak dostaje odpowiedź.
    AlreadyLifted,
}

/// Klucz cache "już zbanowany": (gildia, user).
pub type BannedKey = (u64, u64);

pub struct Moderation {
    platform: Arc<dyn Platform>,
    store: Arc<dyn Store>,
    registry: Arc<GroupRegistry>,
    classifier: Classifier,
    banned: Arc<ExpiringSet<BannedKey>>,
    self_unban_notice: bool,
}

impl Moderation {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn Store>,
        registry: Arc<GroupRegistry>,
        classifier: Classifier,
        banned: Arc<ExpiringSet<BannedKey>>,
        self_unban_notice: bool,
    ) -> Self {
        Self {
            platform,
            store,
            registry,
            classifier,
            banned,
            self_unban_notice,
        }
    }

    pub fn banned(&self) -> &Arc<ExpiringSet<BannedKey>> {
        &self.banned
    }

    /* ==============================
       Ocena + restrykcja
       ============================== */

    pub async fn inspect(&self, incident: &Incident) -> Outcome {
        let gid = incident.group_id;
        let uid = incident.profile.id;

        if uid == self.platform.self_id() {
            return Outcome::Skipped;
        }
        if self.banned.contains(&(gid, uid)) {
            debug!(gid, uid, "recently restricted – skipping re-check");
            return Outcome::Skipped;
        }

        let policy = self.registry.get(gid).await;
        if !policy.empowered {
            // bez uprawnień i tak nic nie zrobimy
            return Outcome::Skipped;
        }
        if policy.admin_id == Some(uid) {
            return Outcome::Skipped;
        }

        let verdict = self.classifier.classify(&policy, &incident.profile).await;
        match verdict.reason {
            Some(reason) if verdict.restrict => {
                self.restrict(&policy, &incident.profile, incident.message, reason).await;
                Outcome::Restricted(reason)
            }
            _ => Outcome::Allowed,
        }
    }

    pub async fn restrict(
        &self,
        policy: &GroupPolicy,
        profile: &Profile,
        message: Option<MessageRef>,
        reason: Reason,
    ) {
        let gid = policy.group_id;
        let uid = profile.id;
        info!(gid, uid, reason = reason.code(), "restricting user");

        if let Some(msg) = message {
            if let Err(e) = self.platform.delete_message(gid, msg).await {
                warn!(error=?e, gid, uid, "delete_message failed");
            }
        }

        if let Err(e) = self.platform.set_permissions(gid, uid, PermissionSet::DenyAll).await {
            warn!(error=?e, gid, uid, "set_permissions(DenyAll) failed");
        }

        let rec = NewBanRecord {
            group_id: gid,
            user_id: uid,
            reason: reason.code().to_string(),
        };
        match self.store.create_ban_record(&rec).await {
            Ok(true) => {}
            Ok(false) => debug!(gid, uid, "active ban record already present"),
            Err(e) => warn!(error=?e, gid, uid, "create_ban_record failed"),
        }

        self.banned.add((gid, uid));

        let lang = policy.language.as_str();
        let reason_text = i18n::translate(lang, reason.code());
        let mention = profile.mention();

        if policy.notify_admin {
            if let Some(admin) = policy.admin_id {
                let group = policy.display_name();
                let text = i18n::translate_with(
                    lang,
                    "notify_restricted",
                    &[
                        ("user", mention.as_str()),
                        ("group", group.as_str()),
                        ("reason", reason_text.as_str()),
                    ],
                );
                let token = Callback::Unban { group_id: gid, user_id: uid };
                let kb = vec![vec![Button::new(i18n::translate(lang, "btn_unban"), token.to_string())]];
                if let Err(e) = self.platform.send_message(Target::User(admin), &text, kb).await {
                    warn!(error=?e, gid, uid, admin, "admin notification failed");
                }
            }
        }

        if self.self_unban_notice && reason.is_self_fixable() {
            if let Some(msg) = message {
                let text = i18n::translate_with(
                    lang,
                    "notice_self_unban",
                    &[("user", mention.as_str()), ("reason", reason_text.as_str())],
                );
                let token = Callback::SelfUnban { group_id: gid, user_id: uid };
                let kb = vec![vec![Button::new(i18n::translate(lang, "btn_self_unban"), token.to_string())]];
                if let Err(e) = self.platform.send_message(Target::Chat(msg.chat_id), &text, kb).await {
                    warn!(error=?e, gid, uid, "self-unban notice failed");
                }
            }
        }
    }

    /* ==============================
       Unban
       ============================== */

    /// Zdejmuje ograniczenie. Błąd platformy przy przywracaniu uprawnień = `Err`, a stan
    /// (wpis, cache) zostaje nietknięty.
    pub async fn unban(&self, group_id: u64, user_id: u64, actor: u64, perms: PermissionSet) -> Result<UnbanOutcome> {
        let active = match self.store.find_active_ban_record(group_id, user_id).await {
            Ok(rec) => rec.is_some(),
            Err(e) => {
                warn!(error=?e, gid = group_id, uid = user_id, "find_active_ban_record failed – assuming active");
                true
            }
        };
        if !active && !self.banned.contains(&(group_id, user_id)) {
            return Ok(UnbanOutcome::AlreadyLifted);
        }

        self.platform.set_permissions(group_id, user_id, perms).await?;

        match self.store.deactivate_ban_record(group_id, user_id, actor).await {
            Ok(true) => {}
            Ok(false) => debug!(gid = group_id, uid = user_id, "no active ban record to deactivate"),
            Err(e) => warn!(error=?e, gid = group_id, uid = user_id, "deactivate_ban_record failed"),
        }
        self.banned.remove(&(group_id, user_id));

        info!(gid = group_id, uid = user_id, actor, ?perms, "restriction lifted");
        Ok(UnbanOutcome::Lifted)
    }

    /// Przycisk `unban:<g>:<u>` z DM admina.
    pub async fn handle_unban_tap(
        &self,
        interaction: &InteractionRef,
        actor: u64,
        group_id: u64,
        user_id: u64,
        message: Option<MessageRef>,
    ) {
        if !self.registry.is_group_admin(group_id, actor).await {
            info!(gid = group_id, uid = user_id, actor, "unban denied – not a group admin");
            let lang = self.registry.language_of(group_id).await;
            self.answer(interaction, &i18n::translate(&lang, "unban_denied"), true).await;
            return;
        }

        let lang = self.registry.language_of(group_id).await;
        let lang = lang.as_str();

        match self.unban(group_id, user_id, actor, PermissionSet::GroupDefault).await {
            Ok(UnbanOutcome::Lifted) => {
                self.answer(interaction, &i18n::translate(lang, "unban_done"), false).await;
                self.mark_resolved(message, lang, user_id, actor).await;
            }
            Ok(UnbanOutcome::AlreadyLifted) => {
                self.answer(interaction, &i18n::translate(lang, "unban_already"), false).await;
            }
            Err(e) => {
                warn!(error=?e, gid = group_id, uid = user_id, "unban failed");
                self.answer(interaction, &i18n::translate(lang, "unban_failed"), true).await;
            }
        }
    }

    /// Przycisk `self_unban:<g>:<u>` pod notką na kanale.
    pub async fn handle_self_unban(
        &self,
        interaction: &InteractionRef,
        actor: u64,
        group_id: u64,
        user_id: u64,
        message: Option<MessageRef>,
    ) {
        let lang = self.registry.language_of(group_id).await;
        let lang = lang.as_str();

        if actor != user_id {
            self.answer(interaction, &i18n::translate(lang, "self_unban_not_you"), true).await;
            return;
        }

        // tylko powody, które user może sam naprawić
        match self.store.find_active_ban_record(group_id, user_id).await {
            Ok(None) if !self.banned.contains(&(group_id, user_id)) => {
                // nic do zdjęcia – nie syntetyzujemy polityki dla obcych id
                self.answer(interaction, &i18n::translate(lang, "unban_already"), false).await;
                return;
            }
            Ok(Some(rec)) => {
                let fixable = Reason::from_code(&rec.reason).is_some_and(Reason::is_self_fixable);
                if !fixable {
                    let reason_text = i18n::translate(lang, &rec.reason);
                    let text = i18n::translate_with(lang, "self_unban_still", &[("reason", reason_text.as_str())]);
                    self.answer(interaction, &text, true).await;
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error=?e, gid = group_id, uid = user_id, "find_active_ban_record failed"),
        }

        let policy = self.registry.get(group_id).await;
        let profile = match self.platform.get_profile(user_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error=?e, gid = group_id, uid = user_id, "profile fetch for self-unban failed");
                self.answer(interaction, &i18n::translate(lang, "unban_failed"), true).await;
                return;
            }
        };

        let verdict = self.classifier.classify(&policy, &profile).await;
        if verdict.restrict {
            let reason_text = i18n::translate(lang, verdict.reason_code());
            let text = i18n::translate_with(lang, "self_unban_still", &[("reason", reason_text.as_str())]);
            self.answer(interaction, &text, true).await;
            return;
        }

        match self.unban(group_id, user_id, user_id, PermissionSet::TextAndMedia).await {
            Ok(UnbanOutcome::Lifted) => {
                self.answer(interaction, &i18n::translate(lang, "unban_done"), false).await;
                self.mark_resolved(message, lang, user_id, user_id).await;
            }
            Ok(UnbanOutcome::AlreadyLifted) => {
                self.answer(interaction, &i18n::translate(lang, "unban_already"), false).await;
            }
            Err(e) => {
                warn!(error=?e, gid = group_id, uid = user_id, "self-unban failed");
                self.answer(interaction, &i18n::translate(lang, "unban_failed"), true).await;
            }
        }
    }

    /// Podmiana wiadomości z przyciskiem na "odbanowany przez …" (bez klawiatury).
    async fn mark_resolved(&self, message: Option<MessageRef>, lang: &str, user_id: u64, actor: u64) {
        let Some(msg) = message else {
            return;
        };
        let user = format!("<@{user_id}>");
        let actor = format!("<@{actor}>");
        let text = i18n::translate_with(lang, "unban_edited", &[("user", user.as_str()), ("actor", actor.as_str())]);
        if let Err(e) = self.platform.edit_message(msg, &text, Vec::new()).await {
            debug!(error=?e, uid = user_id, "edit after unban failed");
        }
    }

    async fn answer(&self, interaction: &InteractionRef, text: &str, alert: bool) {
        if let Err(e) = self.platform.answer_interaction(interaction, text, alert).await {
            warn!(error=?e, "answer_interaction failed");
        }
    }
}
