// src/lib.rs

pub mod callback;
pub mod classifier;
pub mod config;
pub mod db;
pub mod discord;
pub mod engine;
pub mod expiring;
pub mod i18n;
pub mod logging;
pub mod menu;
pub mod permissions;
pub mod platform;
pub mod policy;
pub mod reputation;
pub mod store;
pub mod workflow;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serenity::http::Http;
use tokio::task::JoinHandle;

use config::Settings;
use discord::SerenityPlatform;
use engine::Engine;
use store::{MemoryStore, Store};

/// Globalny kontekst aplikacji.
/// Konfiguracja, adapter Discorda i gotowy silnik moderacji (pula DB żyje w magazynie).
pub struct AppContext {
    pub settings: Settings,
    pub platform: Arc<SerenityPlatform>,
    pub engine: Arc<Engine>,
    sweepers: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - połączenie z DB + migracje (albo magazyn w pamięci, gdy brak URL)
    /// - adapter Discorda, silnik, taski sprzątające cache
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings.logging);
        tracing::info!(env = %settings.env, app = %settings.app.name, "bootstrapping");

        // 2) magazyn
        let store: Arc<dyn Store> = if settings.database.url.is_empty() {
            tracing::warn!("database.url is empty – using in-memory store (state is lost on restart)");
            Arc::new(MemoryStore::new())
        } else {
            let db = db::connect(&settings.database.url, settings.database.max_connections).await?;
            db::migrate(&db).await?;
            Arc::new(db::PgStore::new(db))
        };

        // 3) Discord (HTTP) – potrzebny już tu, żeby znać własne id
        if settings.discord.token.is_empty() {
            anyhow::bail!("Brak tokenu Discord (TGK_DISCORD__TOKEN). Uzupełnij w .env.");
        }
        let http = Arc::new(Http::new(&settings.discord.token));
        let platform = Arc::new(SerenityPlatform::connect(http).await?);

        // 4) silnik + sprzątanie
        let engine = Arc::new(Engine::new(&settings, platform.clone(), store)?);
        let sweepers = engine.spawn_sweepers(Duration::from_secs(settings.moderation.sweep_interval_secs));

        Ok(Arc::new(Self {
            settings,
            platform,
            engine,
            sweepers: Mutex::new(sweepers),
        }))
    }

    /// Zatrzymuje taski tła. Wielokrotne wywołanie jest bezpieczne.
    pub fn shutdown(&self) {
        let handles = match self.sweepers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for h in &handles {
            h.abort();
        }
        if !handles.is_empty() {
            tracing::info!(tasks = handles.len(), "background sweepers stopped");
        }
    }
}

/// Start klienta Discorda (Gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
