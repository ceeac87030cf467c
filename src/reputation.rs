//! src/reputation.rs
//! Zapytanie do zewnętrznego rejestru antyspamowego (CAS).
//!
//! Zasady:
//! - trafienie w zbiorze "niedawno sprawdzony" => brak sygnału, zero ruchu sieciowego,
//! - globalny limiter (governor) – po wyczerpaniu limitu też brak sygnału,
//! - każdy błąd (transport, status != 200, zły JSON) => brak sygnału + log (fail-open),
//! - poprawnie zdekodowana odpowiedź => user trafia do zbioru niezależnie od werdyktu.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{Reason, Verdict};
use crate::config::ReputationConfig;
use crate::expiring::ExpiringSet;

#[derive(Debug, Deserialize)]
struct CasResponse {
    ok: bool,
    #[serde(default)]
    result: Option<CasResult>,
}

#[derive(Debug, Deserialize)]
struct CasResult {
    #[serde(default)]
    offenses: u32,
}

pub struct ReputationLookup {
    http: Client,
    base_url: Url,
    checked: Arc<ExpiringSet>,
    limiter: DefaultDirectRateLimiter,
}

impl ReputationLookup {
    pub fn new(cfg: &ReputationConfig, checked: Arc<ExpiringSet>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("Tigris-Gatekeeper/1.0")
            .connect_timeout(Duration::from_millis(cfg.timeout_ms.min(1_500)))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        let base_url = Url::parse(&cfg.base_url)?;
        let per_sec = NonZeroU32::new(cfg.max_requests_per_sec).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            base_url,
            checked,
            limiter: RateLimiter::direct(Quota::per_second(per_sec)),
        })
    }

    pub fn checked(&self) -> &Arc<ExpiringSet> {
        &self.checked
    }

    pub async fn check(&self, user_id: u64) -> Verdict {
        if self.checked.contains(&user_id) {
            return Verdict::allow();
        }
        if self.limiter.check().is_err() {
            debug!(uid = user_id, "CAS rate limit hit – skipping lookup");
            return Verdict::allow();
        }

        match self.fetch_offenses(user_id).await {
            Ok(offenses) => {
                self.checked.add(user_id);
                if offenses > 0 {
                    info!(uid = user_id, offenses, "CAS: user is blacklisted");
                    Verdict::restrict(Reason::CasBlacklisted)
                } else {
                    Verdict::allow()
                }
            }
            Err(e) => {
                warn!(error=?e, uid = user_id, "CAS lookup failed (fail-open)");
                Verdict::allow()
            }
        }
    }

    /// Liczba wykroczeń według rejestru; `ok=false` (brak wpisu) => 0.
    async fn fetch_offenses(&self, user_id: u64) -> Result<u32> {
        let mut url = self.base_url.join("check")?;
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string());

        let resp = self.http.get(url).send().await?;
        if resp.status() != StatusCode::OK {
            bail!("CAS returned HTTP {}", resp.status());
        }
        let bytes = resp.bytes().await?;
        let body: CasResponse = serde_json::from_slice(&bytes)
            .with_context(|| format!("undecodable CAS body ({} bytes)", bytes.len()))?;
        if !body.ok {
            return Ok(0);
        }
        Ok(body.result.map(|r| r.offenses).unwrap_or(0))
    }
}
