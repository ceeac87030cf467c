#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;

use tigris_gatekeeper::classifier::Classifier;
use tigris_gatekeeper::config::Settings;
use tigris_gatekeeper::expiring::ExpiringSet;
use tigris_gatekeeper::permissions::PermissionSet;
use tigris_gatekeeper::platform::{
    EmpoweredMember, GroupInfo, InteractionRef, Keyboard, MessageRef, Platform, Profile, Target,
};
use tigris_gatekeeper::policy::{GroupPolicy, GroupRegistry};
use tigris_gatekeeper::store::{BanRecord, NewBanRecord, Store};
use tigris_gatekeeper::workflow::Moderation;

pub const BOT: u64 = 999;

/// Wszystko, co rdzeń zrobił "na zewnątrz" (odczyty nie są logowane).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetPermissions { group_id: u64, user_id: u64, perms: PermissionSet },
    Delete { group_id: u64, message: MessageRef },
    Send { target: Target, text: String, keyboard: Keyboard },
    Edit { message: MessageRef, text: String, keyboard: Keyboard },
    Answer { text: String, alert: bool },
}

#[derive(Default)]
pub struct FakePlatform {
    pub profiles: DashMap<u64, Profile>,
    pub members: DashMap<u64, Vec<EmpoweredMember>>,
    pub fail_delete: AtomicBool,
    pub fail_set_permissions: AtomicBool,
    pub fail_members: AtomicBool,
    /// Ile razy pobrano pełną listę uprawnionych.
    pub full_listings: AtomicU64,
    calls: Mutex<Vec<Call>>,
    next_msg: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gildia, w której bot ma uprawnienia, a `owner` jest właścicielem.
    pub fn empowered_group(&self, group_id: u64, owner: u64) {
        self.members.insert(
            group_id,
            vec![member(BOT, false, false, true), member(owner, true, true, false)],
        );
    }

    pub fn add_member(&self, group_id: u64, m: EmpoweredMember) {
        self.members.entry(group_id).or_default().push(m);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn answers(&self) -> Vec<(String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Answer { text, alert } => Some((text, alert)),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(Target, String, Keyboard)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { target, text, keyboard } => Some((target, text, keyboard)),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String, Keyboard)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Edit { message, text, keyboard } => Some((message, text, keyboard)),
                _ => None,
            })
            .collect()
    }

    pub fn permissions(&self) -> Vec<(u64, u64, PermissionSet)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetPermissions { group_id, user_id, perms } => Some((group_id, user_id, perms)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn member(user_id: u64, is_owner: bool, can_grant: bool, is_bot: bool) -> EmpoweredMember {
    EmpoweredMember {
        user_id,
        is_bot,
        is_owner,
        can_grant,
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn self_id(&self) -> u64 {
        BOT
    }

    async fn get_profile(&self, user_id: u64) -> Result<Profile> {
        self.profiles
            .get(&user_id)
            .map(|p| p.clone())
            .ok_or_else(|| anyhow!("unknown user {user_id}"))
    }

    async fn set_permissions(&self, group_id: u64, user_id: u64, perms: PermissionSet) -> Result<()> {
        if self.fail_set_permissions.load(Ordering::SeqCst) {
            bail!("set_permissions refused");
        }
        self.record(Call::SetPermissions { group_id, user_id, perms });
        Ok(())
    }

    async fn delete_message(&self, group_id: u64, message: MessageRef) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            bail!("message already gone");
        }
        self.record(Call::Delete { group_id, message });
        Ok(())
    }

    async fn send_message(&self, target: Target, text: &str, keyboard: Keyboard) -> Result<MessageRef> {
        self.record(Call::Send {
            target,
            text: text.to_string(),
            keyboard,
        });
        let chat_id = match target {
            Target::User(u) => u,
            Target::Chat(c) => c,
        };
        Ok(MessageRef {
            chat_id,
            message_id: self.next_msg.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Keyboard) -> Result<()> {
        self.record(Call::Edit {
            message,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn list_empowered_members(&self, group_id: u64) -> Result<Vec<EmpoweredMember>> {
        if self.fail_members.load(Ordering::SeqCst) {
            bail!("members endpoint unavailable");
        }
        self.full_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.get(&group_id).map(|m| m.clone()).unwrap_or_default())
    }

    async fn empowered_member(&self, group_id: u64, user_id: u64) -> Result<Option<EmpoweredMember>> {
        if self.fail_members.load(Ordering::SeqCst) {
            bail!("members endpoint unavailable");
        }
        Ok(self
            .members
            .get(&group_id)
            .and_then(|m| m.iter().find(|m| m.user_id == user_id).copied()))
    }

    async fn answer_interaction(&self, _interaction: &InteractionRef, text: &str, alert: bool) -> Result<()> {
        self.record(Call::Answer {
            text: text.to_string(),
            alert,
        });
        Ok(())
    }

    async fn group_info(&self, group_id: u64) -> Result<GroupInfo> {
        Ok(GroupInfo {
            title: format!("Group {group_id}"),
            link: None,
        })
    }
}

/// Magazyn, który zawsze zwraca błąd (baza leży).
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn load_policy(&self, _group_id: u64) -> Result<Option<GroupPolicy>> {
        bail!("db down")
    }

    async fn save_policy(&self, _policy: &GroupPolicy) -> Result<()> {
        bail!("db down")
    }

    async fn create_ban_record(&self, _rec: &NewBanRecord) -> Result<bool> {
        bail!("db down")
    }

    async fn find_active_ban_record(&self, _group_id: u64, _user_id: u64) -> Result<Option<BanRecord>> {
        bail!("db down")
    }

    async fn deactivate_ban_record(&self, _group_id: u64, _user_id: u64, _actor: u64) -> Result<bool> {
        bail!("db down")
    }

    async fn list_policies_by_admin(&self, _admin_id: u64) -> Result<Vec<GroupPolicy>> {
        bail!("db down")
    }
}

/// Ustawienia testowe: bez CAS (żadnego ruchu sieciowego).
pub fn settings() -> Settings {
    let mut s = Settings::defaults("test");
    s.reputation.enabled = false;
    s.database.url = String::new();
    s
}

pub fn interaction() -> InteractionRef {
    InteractionRef {
        id: 1,
        token: "tok".into(),
    }
}

pub fn profile(id: u64, first_name: &str) -> Profile {
    Profile {
        id,
        first_name: first_name.into(),
        ..Default::default()
    }
}

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub registry: Arc<GroupRegistry>,
    pub moderation: Moderation,
}

pub fn harness(platform: Arc<FakePlatform>, store: Arc<dyn Store>) -> Harness {
    let s = settings();
    let registry = GroupRegistry::new(store.clone(), platform.clone(), s.defaults.clone());
    let classifier = Classifier::new(platform.clone(), None);
    let banned = ExpiringSet::new("banned", std::time::Duration::from_secs(s.moderation.banned_ttl_secs));
    let moderation = Moderation::new(
        platform.clone(),
        store,
        registry.clone(),
        classifier,
        banned,
        s.moderation.self_unban_notice,
    );
    Harness {
        platform,
        registry,
        moderation,
    }
}
