use crate::config::Logging;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Inicjalizacja logowania.
/// RUST_LOG ma pierwszeństwo przed poziomem z konfiguracji.
/// `json = true` => jedna linia JSON na zdarzenie (pod zbieracze logów), inaczej tekst.
pub fn init(cfg: &Logging) {
    let level = cfg.level.clone().unwrap_or_else(|| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},serenity=warn,sqlx=warn")));

    let json = cfg.json.unwrap_or(false);
    // Option<Layer> też jest warstwą: włączona jest dokładnie jedna z dwóch
    let json_layer = json.then(|| fmt::layer().json().with_target(true).with_current_span(false));
    let text_layer = (!json).then(|| fmt::layer().with_target(true));

    // try_init: w testach subskrybent mógł już zostać ustawiony
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();
}
