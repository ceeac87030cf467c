//! src/expiring.rs
//! Zbiór kluczy z czasem wygaśnięcia (dedup "już sprawdzony w CAS", "już zbanowany").
//!
//! - `contains` nigdy nie modyfikuje mapy: przeterminowany wpis jest logicznie nieobecny,
//!   fizycznie usuwa go dopiero `sweep` (ręcznie albo z taska `spawn_sweeper`).
//! - DashMap = shardowany RwLock: czytelnicy nie blokują się nawzajem,
//!   zapis trzyma shard tylko na czas insert/remove (zero I/O pod lockiem).
//! - Czas z `tokio::time::Instant`, więc testy mogą go przesuwać (`start_paused`).

use std::{hash::Hash, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

#[derive(Debug)]
pub struct ExpiringSet<K = u64>
where
    K: Eq + Hash,
{
    name: &'static str,
    ttl: Duration,
    entries: DashMap<K, Instant>,
}

impl<K> ExpiringSet<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            ttl,
            entries: DashMap::new(),
        })
    }

    /// Wstawia albo odświeża wpis: wygasa za `ttl` od teraz.
    pub fn add(&self, key: K) {
        self.entries.insert(key, Instant::now() + self.ttl);
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Fizyczna liczba wpisów (razem z jeszcze nieposprzątanymi).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Jedno przejście sprzątające; zwraca liczbę usuniętych wpisów.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Cykliczny sweep. Task kończy się sam, gdy zbiór zostanie zdropowany;
    /// przy shutdownie wystarczy `abort()` na zwróconym uchwycie.
    pub fn spawn_sweeper(this: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // pierwszy tick jest natychmiastowy – pomijamy
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(strong) = weak.upgrade() else {
                    break;
                };
                let removed = strong.sweep();
                if removed > 0 {
                    debug!(set = strong.name, removed, left = strong.len(), "expiring set swept");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn add_then_contains_until_ttl() {
        let set: Arc<ExpiringSet> = ExpiringSet::new("t", Duration::from_secs(600));
        set.add(7);
        assert!(set.contains(&7));
        assert!(!set.contains(&8));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(set.contains(&7));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!set.contains(&7));
        // lookup niczego nie usuwa
        assert_eq!(set.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn add_refreshes_expiry() {
        let set: Arc<ExpiringSet> = ExpiringSet::new("t", Duration::from_secs(60));
        set.add(1);
        tokio::time::advance(Duration::from_secs(50)).await;
        set.add(1);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(set.contains(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_purges_only_expired() {
        let set: Arc<ExpiringSet<(u64, u64)>> = ExpiringSet::new("t", Duration::from_secs(10));
        set.add((1, 1));
        tokio::time::advance(Duration::from_secs(11)).await;
        set.add((1, 2));

        assert_eq!(set.sweep(), 1);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&(1, 2)));
        assert_eq!(set.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_is_idempotent() {
        let set: Arc<ExpiringSet> = ExpiringSet::new("t", Duration::from_secs(10));
        set.add(5);
        set.remove(&5);
        set.remove(&5);
        assert!(!set.contains(&5));
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_cleans_up() {
        let set: Arc<ExpiringSet> = ExpiringSet::new("t", Duration::from_secs(5));
        let handle = ExpiringSet::spawn_sweeper(&set, Duration::from_secs(60));
        set.add(1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        // oddaj sterowanie taskowi sweepera
        tokio::task::yield_now().await;
        assert!(set.is_empty());

        handle.abort();
    }
}
