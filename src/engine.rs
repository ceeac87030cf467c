//! src/engine.rs
//! Fasada nad rdzeniem: składa serwisy i mapuje zdarzenia platformy na workflow/menu.
//! Adapter Discorda (`discord::Handler`) woła tylko to.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback::{Callback, CallbackError};
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::expiring::ExpiringSet;
use crate::i18n;
use crate::menu::SettingsMenu;
use crate::platform::{InteractionRef, MessageRef, Platform, Profile};
use crate::policy::GroupRegistry;
use crate::reputation::ReputationLookup;
use crate::store::Store;
use crate::workflow::{Incident, Moderation, Outcome};

/// Kliknięcie przycisku.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub interaction: InteractionRef,
    pub user_id: u64,
    /// Surowy token (`custom_id`).
    pub data: String,
    /// Wiadomość, pod którą był przycisk.
    pub message: Option<MessageRef>,
}

pub struct Engine {
    platform: Arc<dyn Platform>,
    registry: Arc<GroupRegistry>,
    moderation: Moderation,
    menu: SettingsMenu,
    reputation: Option<Arc<ReputationLookup>>,
}

impl Engine {
    pub fn new(settings: &Settings, platform: Arc<dyn Platform>, store: Arc<dyn Store>) -> Result<Self> {
        let reputation = if settings.reputation.enabled {
            let checked = ExpiringSet::new(
                "cas_checked",
                Duration::from_secs(settings.reputation.recheck_ttl_secs),
            );
            Some(Arc::new(ReputationLookup::new(&settings.reputation, checked)?))
        } else {
            info!("CAS lookups disabled");
            None
        };

        let registry = GroupRegistry::new(store.clone(), platform.clone(), settings.defaults.clone());
        let banned = ExpiringSet::new(
            "recently_banned",
            Duration::from_secs(settings.moderation.banned_ttl_secs),
        );
        let classifier = Classifier::new(platform.clone(), reputation.clone());
        let moderation = Moderation::new(
            platform.clone(),
            store,
            registry.clone(),
            classifier,
            banned,
            settings.moderation.self_unban_notice,
        );
        let menu = SettingsMenu::new(registry.clone(), platform.clone());

        Ok(Self {
            platform,
            registry,
            moderation,
            menu,
            reputation,
        })
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub fn moderation(&self) -> &Moderation {
        &self.moderation
    }

    pub fn menu(&self) -> &SettingsMenu {
        &self.menu
    }

    /// Sprzątanie obu cache'y; uchwyty do przerwania przy wyłączaniu.
    pub fn spawn_sweepers(&self, every: Duration) -> Vec<JoinHandle<()>> {
        let mut handles = vec![ExpiringSet::spawn_sweeper(self.moderation.banned(), every)];
        if let Some(rep) = &self.reputation {
            handles.push(ExpiringSet::spawn_sweeper(rep.checked(), every));
        }
        handles
    }

    /* ==============================
       Zdarzenia z gildii
       ============================== */

    pub async fn on_member_joined(&self, group_id: u64, profile: Profile) -> Outcome {
        let incident = Incident {
            group_id,
            profile,
            message: None,
        };
        self.moderation.inspect(&incident).await
    }

    pub async fn on_message(&self, group_id: u64, profile: Profile, message: MessageRef) -> Outcome {
        let incident = Incident {
            group_id,
            profile,
            message: Some(message),
        };
        self.moderation.inspect(&incident).await
    }

    /// Gildia widoczna (start/dołączenie) – rozgrzewa rejestr.
    pub async fn on_group_seen(&self, group_id: u64) {
        let policy = self.registry.get(group_id).await;
        debug!(gid = group_id, empowered = policy.empowered, "group seen");
    }

    /// Zmiana naszych uprawnień w gildii – sprawdzamy na żywo, czy jesteśmy na liście.
    pub async fn on_bot_membership_changed(&self, group_id: u64) {
        let self_id = self.platform.self_id();
        match self.platform.list_empowered_members(group_id).await {
            Ok(members) => {
                let empowered = members.iter().any(|m| m.user_id == self_id);
                let was = self.registry.get(group_id).await.empowered;
                if empowered == was {
                    return;
                }
                if empowered {
                    let p = self.registry.on_promoted(group_id, None).await;
                    info!(gid = group_id, admin = ?p.admin_id, "moderator promoted");
                } else {
                    self.registry.on_demoted(group_id).await;
                    info!(gid = group_id, "moderator demoted");
                }
            }
            Err(e) => warn!(error=?e, gid = group_id, "empowered member lookup failed"),
        }
    }

    /* ==============================
       Prywatne rozmowy i przyciski
       ============================== */

    pub async fn on_private_text(&self, user_id: u64, text: &str) {
        if !self.menu.on_private_text(user_id, text).await {
            debug!(uid = user_id, "private text ignored");
        }
    }

    pub async fn on_settings_command(&self, user_id: u64) -> Result<MessageRef> {
        self.menu.open(user_id).await
    }

    pub async fn on_callback(&self, ev: CallbackEvent) {
        let cb = match ev.data.parse::<Callback>() {
            Ok(cb) => cb,
            Err(CallbackError::UnknownVerb(verb)) => {
                debug!(verb = %verb, uid = ev.user_id, "ignoring foreign callback");
                return;
            }
            Err(e @ CallbackError::Malformed { .. }) => {
                info!(error = %e, uid = ev.user_id, "malformed callback");
                let lang = group_hint(&ev.data)
                    .and_then(|gid| self.registry.cached(gid))
                    .map(|p| p.language)
                    .unwrap_or_else(|| i18n::DEFAULT_LANG.to_string());
                if let Err(e) = self
                    .platform
                    .answer_interaction(&ev.interaction, &i18n::translate(&lang, "menu_bad_token"), true)
                    .await
                {
                    warn!(error=?e, "answer_interaction failed");
                }
                return;
            }
        };

        match cb {
            Callback::Unban { group_id, user_id } => {
                self.moderation
                    .handle_unban_tap(&ev.interaction, ev.user_id, group_id, user_id, ev.message)
                    .await
            }
            Callback::SelfUnban { group_id, user_id } => {
                self.moderation
                    .handle_self_unban(&ev.interaction, ev.user_id, group_id, user_id, ev.message)
                    .await
            }
            menu_cb => {
                self.menu
                    .on_callback(&ev.interaction, ev.user_id, ev.message, menu_cb)
                    .await
            }
        }
    }
}

/// Język odpowiedzi na zepsuty token: z gildii w pamięci, jeśli drugie pole da się odczytać.
fn group_hint(data: &str) -> Option<u64> {
    data.split(':').nth(1).and_then(|g| g.parse().ok())
}
