//! src/store.rs
//! Trwały magazyn: polityki gildii + historia banów.
//! Produkcyjnie `db::PgStore`; `MemoryStore` dla developmentu bez bazy i dla testów.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::policy::GroupPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub id: i64,
    pub group_id: u64,
    pub user_id: u64,
    /// Kod powodu, np. `reason_emoji_name`.
    pub reason: String,
    pub unbanned: bool,
    pub unbanned_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBanRecord {
    pub group_id: u64,
    pub user_id: u64,
    pub reason: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_policy(&self, group_id: u64) -> Result<Option<GroupPolicy>>;

    async fn save_policy(&self, policy: &GroupPolicy) -> Result<()>;

    /// `Ok(false)`, gdy aktywny wpis dla (gildia, user) już istnieje – bez duplikatu.
    async fn create_ban_record(&self, rec: &NewBanRecord) -> Result<bool>;

    async fn find_active_ban_record(&self, group_id: u64, user_id: u64) -> Result<Option<BanRecord>>;

    /// Dezaktywuje aktywny wpis; `Ok(false)`, gdy nie było czego dezaktywować.
    async fn deactivate_ban_record(&self, group_id: u64, user_id: u64, actor: u64) -> Result<bool>;

    async fn list_policies_by_admin(&self, admin_id: u64) -> Result<Vec<GroupPolicy>>;
}

/* ==============================
   Implementacja w pamięci
   ============================== */

#[derive(Debug, Default)]
pub struct MemoryStore {
    policies: DashMap<u64, GroupPolicy>,
    bans: Mutex<Vec<BanRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cała historia (także nieaktywne) – do podglądu w testach.
    pub fn ban_records(&self, group_id: u64, user_id: u64) -> Vec<BanRecord> {
        self.bans
            .lock()
            .map(|bans| {
                bans.iter()
                    .filter(|r| r.group_id == group_id && r.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_policy(&self, group_id: u64) -> Result<Option<GroupPolicy>> {
        Ok(self.policies.get(&group_id).map(|p| p.clone()))
    }

    async fn save_policy(&self, policy: &GroupPolicy) -> Result<()> {
        self.policies.insert(policy.group_id, policy.clone());
        Ok(())
    }

    async fn create_ban_record(&self, rec: &NewBanRecord) -> Result<bool> {
        let mut bans = self.bans.lock().map_err(|_| anyhow!("ban store poisoned"))?;
        if bans
            .iter()
            .any(|r| r.group_id == rec.group_id && r.user_id == rec.user_id && !r.unbanned)
        {
            return Ok(false);
        }
        let now = Utc::now();
        let id = bans.len() as i64 + 1;
        bans.push(BanRecord {
            id,
            group_id: rec.group_id,
            user_id: rec.user_id,
            reason: rec.reason.clone(),
            unbanned: false,
            unbanned_by: None,
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    async fn find_active_ban_record(&self, group_id: u64, user_id: u64) -> Result<Option<BanRecord>> {
        let bans = self.bans.lock().map_err(|_| anyhow!("ban store poisoned"))?;
        Ok(bans
            .iter()
            .find(|r| r.group_id == group_id && r.user_id == user_id && !r.unbanned)
            .cloned())
    }

    async fn deactivate_ban_record(&self, group_id: u64, user_id: u64, actor: u64) -> Result<bool> {
        let mut bans = self.bans.lock().map_err(|_| anyhow!("ban store poisoned"))?;
        let Some(rec) = bans
            .iter_mut()
            .find(|r| r.group_id == group_id && r.user_id == user_id && !r.unbanned)
        else {
            return Ok(false);
        };
        rec.unbanned = true;
        rec.unbanned_by = Some(actor);
        rec.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_policies_by_admin(&self, admin_id: u64) -> Result<Vec<GroupPolicy>> {
        Ok(self
            .policies
            .iter()
            .filter(|p| p.admin_id == Some(admin_id))
            .map(|p| p.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(g: u64, u: u64) -> NewBanRecord {
        NewBanRecord {
            group_id: g,
            user_id: u,
            reason: "reason_emoji_name".into(),
        }
    }

    #[tokio::test]
    async fn single_active_record_per_pair() {
        let store = MemoryStore::new();
        assert!(store.create_ban_record(&rec(1, 2)).await.unwrap());
        assert!(!store.create_ban_record(&rec(1, 2)).await.unwrap());
        // inna gildia – osobny wpis
        assert!(store.create_ban_record(&rec(9, 2)).await.unwrap());
        assert_eq!(store.ban_records(1, 2).len(), 1);
    }

    #[tokio::test]
    async fn deactivate_stamps_actor_once() {
        let store = MemoryStore::new();
        store.create_ban_record(&rec(1, 2)).await.unwrap();

        assert!(store.deactivate_ban_record(1, 2, 77).await.unwrap());
        assert!(!store.deactivate_ban_record(1, 2, 88).await.unwrap());

        let all = store.ban_records(1, 2);
        assert_eq!(all.len(), 1);
        assert!(all[0].unbanned);
        assert_eq!(all[0].unbanned_by, Some(77));
        assert!(store.find_active_ban_record(1, 2).await.unwrap().is_none());

        // po unbanie można zbanować ponownie
        assert!(store.create_ban_record(&rec(1, 2)).await.unwrap());
        assert_eq!(store.ban_records(1, 2).len(), 2);
    }
}
