//! src/policy.rs
//! Polityka per gildia + rejestr gildii.
//!
//! `get`: pamięć -> magazyn -> synteza z domyślnych (z żywym podglądem listy adminów).
//! `update`: zapis do pamięci, potem do magazynu; błąd magazynu tylko logujemy –
//! pamięć pozostaje źródłem prawdy do końca życia procesu.
//! DashMap: referencje (`Ref`) nigdy nie żyją przez `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PolicyDefaults;
use crate::i18n;
use crate::platform::{EmpoweredMember, Platform};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPolicy {
    pub group_id: u64,
    /// Kto dostaje powiadomienia; `None` = jeszcze nieustalony.
    pub admin_id: Option<u64>,
    pub restrict_premium: bool,
    pub restrict_emoji_name: bool,
    pub restrict_random_username: bool,
    pub restrict_bio_link: bool,
    pub use_reputation: bool,
    pub notify_admin: bool,
    pub language: String,
    /// Czy moderator faktycznie ma uprawnienia w tej gildii.
    pub empowered: bool,
    pub title: String,
    pub link: Option<String>,
}

impl GroupPolicy {
    pub fn from_defaults(group_id: u64, d: &PolicyDefaults) -> Self {
        Self {
            group_id,
            admin_id: None,
            restrict_premium: d.restrict_premium,
            restrict_emoji_name: d.restrict_emoji_name,
            restrict_random_username: d.restrict_random_username,
            restrict_bio_link: d.restrict_bio_link,
            use_reputation: d.use_reputation,
            notify_admin: d.notify_admin,
            language: d.language.clone(),
            empowered: false,
            title: String::new(),
            link: None,
        }
    }

    /// Nazwa do wiadomości; gdy tytuł nieznany – samo id.
    pub fn display_name(&self) -> String {
        if self.title.is_empty() {
            self.group_id.to_string()
        } else {
            self.title.clone()
        }
    }
}

/// Heurystyka "kto nas awansował": pierwszy *inny* nie-bot admin, który może nadawać
/// uprawnienia (właściciel ma pierwszeństwo). Best-effort – przy kilku adminach
/// może wskazać złą osobę.
pub fn guess_promoter(members: &[EmpoweredMember], self_id: u64) -> Option<u64> {
    let candidates = || {
        members
            .iter()
            .filter(move |m| m.user_id != self_id && !m.is_bot && m.can_grant)
    };
    candidates()
        .find(|m| m.is_owner)
        .or_else(|| candidates().next())
        .map(|m| m.user_id)
}

pub struct GroupRegistry {
    cache: DashMap<u64, GroupPolicy>,
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    defaults: PolicyDefaults,
}

impl GroupRegistry {
    pub fn new(store: Arc<dyn Store>, platform: Arc<dyn Platform>, defaults: PolicyDefaults) -> Arc<Self> {
        Arc::new(Self {
            cache: DashMap::new(),
            store,
            platform,
            defaults,
        })
    }

    pub fn cached(&self, group_id: u64) -> Option<GroupPolicy> {
        self.cache.get(&group_id).map(|p| p.clone())
    }

    /// Odczyt bez skutków ubocznych: pamięć -> magazyn, bez syntezy i bez zapisu.
    /// Dla ścieżek, które jeszcze nie wiedzą, czy wołający ma prawo cokolwiek zmienić.
    pub async fn peek(&self, group_id: u64) -> Option<GroupPolicy> {
        if let Some(p) = self.cached(group_id) {
            return Some(p);
        }
        match self.store.load_policy(group_id).await {
            Ok(p) => p,
            Err(e) => {
                debug!(error=?e, gid = group_id, "load_policy failed during peek");
                None
            }
        }
    }

    /// Język gildii do odpowiedzi (np. odmowy); nieznana gildia = domyślny.
    pub async fn language_of(&self, group_id: u64) -> String {
        self.peek(group_id)
            .await
            .map(|p| p.language)
            .unwrap_or_else(|| i18n::DEFAULT_LANG.to_string())
    }

    pub async fn get(&self, group_id: u64) -> GroupPolicy {
        if let Some(p) = self.cached(group_id) {
            return p;
        }

        match self.store.load_policy(group_id).await {
            Ok(Some(p)) => {
                // ktoś mógł w międzyczasie zsyntetyzować/zaktualizować – wygrywa pamięć
                return self.cache.entry(group_id).or_insert(p).clone();
            }
            Ok(None) => {}
            Err(e) => warn!(error=?e, gid = group_id, "load_policy failed – synthesizing"),
        }

        let policy = self.synthesize(group_id).await;
        self.update(policy.clone()).await;
        policy
    }

    async fn synthesize(&self, group_id: u64) -> GroupPolicy {
        let mut policy = GroupPolicy::from_defaults(group_id, &self.defaults);
        let self_id = self.platform.self_id();

        match self.platform.list_empowered_members(group_id).await {
            Ok(members) => {
                policy.empowered = members.iter().any(|m| m.user_id == self_id);
                if policy.empowered {
                    policy.admin_id = guess_promoter(&members, self_id);
                }
            }
            Err(e) => debug!(error=?e, gid = group_id, "list_empowered_members failed during synthesis"),
        }

        match self.platform.group_info(group_id).await {
            Ok(info) => {
                policy.title = info.title;
                policy.link = info.link;
            }
            Err(e) => debug!(error=?e, gid = group_id, "group_info failed during synthesis"),
        }

        info!(gid = group_id, empowered = policy.empowered, admin = ?policy.admin_id, "group policy created");
        policy
    }

    pub async fn update(&self, policy: GroupPolicy) {
        let gid = policy.group_id;
        self.cache.insert(gid, policy.clone());
        if let Err(e) = self.store.save_policy(&policy).await {
            warn!(error=?e, gid, "save_policy failed (memory stays authoritative)");
        }
    }

    /// Moderator dostał uprawnienia. `promoted_by`, jeśli platforma go zna;
    /// w przeciwnym razie zgadujemy z listy adminów.
    pub async fn on_promoted(&self, group_id: u64, promoted_by: Option<u64>) -> GroupPolicy {
        let mut policy = self.get(group_id).await;
        policy.empowered = true;
        if policy.admin_id.is_none() {
            policy.admin_id = match promoted_by {
                Some(uid) => Some(uid),
                None => match self.platform.list_empowered_members(group_id).await {
                    Ok(members) => guess_promoter(&members, self.platform.self_id()),
                    Err(e) => {
                        debug!(error=?e, gid = group_id, "promoter lookup failed");
                        None
                    }
                },
            };
        }
        self.update(policy.clone()).await;
        policy
    }

    pub async fn on_demoted(&self, group_id: u64) -> GroupPolicy {
        let mut policy = self.get(group_id).await;
        policy.empowered = false;
        self.update(policy.clone()).await;
        policy
    }

    /// Jawne przejęcie gildii przez admina (z menu). Nie nadpisuje istniejącego admina.
    pub async fn claim_admin(&self, group_id: u64, user_id: u64) -> GroupPolicy {
        let mut policy = self.get(group_id).await;
        if policy.admin_id.is_none() {
            policy.admin_id = Some(user_id);
            info!(gid = group_id, uid = user_id, "group admin claimed");
            self.update(policy.clone()).await;
        }
        policy
    }

    /// Gildie, w których `admin_id` to ten user. Pamięć ma pierwszeństwo przed magazynem.
    pub async fn groups_for_admin(&self, admin_id: u64) -> Vec<GroupPolicy> {
        let mut out: Vec<GroupPolicy> = self
            .cache
            .iter()
            .filter(|e| e.admin_id == Some(admin_id))
            .map(|e| e.value().clone())
            .collect();

        match self.store.list_policies_by_admin(admin_id).await {
            Ok(stored) => {
                for p in stored {
                    // wpis w pamięci (nawet z innym adminem) jest aktualniejszy
                    if self.cache.contains_key(&p.group_id) {
                        continue;
                    }
                    out.push(p);
                }
            }
            Err(e) => warn!(error=?e, uid = admin_id, "list_policies_by_admin failed"),
        }

        out.sort_by_key(|p| p.group_id);
        out.dedup_by_key(|p| p.group_id);
        out
    }

    /// Zapisany admin ALBO (na żywo) członek z uprawnieniami. Błąd platformy = odmowa.
    /// Niczego nie tworzy ani nie zapisuje: odmowa zostawia rejestr i magazyn w spokoju.
    pub async fn is_group_admin(&self, group_id: u64, user_id: u64) -> bool {
        let recorded = self.peek(group_id).await.and_then(|p| p.admin_id);
        if recorded == Some(user_id) {
            return true;
        }
        match self.platform.empowered_member(group_id, user_id).await {
            Ok(member) => member.is_some_and(|m| !m.is_bot),
            Err(e) => {
                warn!(error=?e, gid = group_id, uid = user_id, "live admin check failed – denying");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: u64, owner: bool, grant: bool, bot: bool) -> EmpoweredMember {
        EmpoweredMember {
            user_id,
            is_bot: bot,
            is_owner: owner,
            can_grant: grant,
        }
    }

    #[test]
    fn promoter_guess_prefers_owner_and_skips_self_and_bots() {
        let members = vec![
            member(1, false, true, false), // my (bot moderatora)
            member(2, false, true, true),  // inny bot
            member(3, false, false, false),
            member(4, false, true, false),
            member(5, true, true, false),
        ];
        assert_eq!(guess_promoter(&members, 1), Some(5));

        let no_owner = &members[..4];
        assert_eq!(guess_promoter(no_owner, 1), Some(4));

        assert_eq!(guess_promoter(&members[..3], 1), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut p = GroupPolicy::from_defaults(42, &PolicyDefaults::default());
        assert_eq!(p.display_name(), "42");
        p.title = "Tigris".into();
        assert_eq!(p.display_name(), "Tigris");
    }
}
