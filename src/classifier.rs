//! src/classifier.rs
//! Klasyfikator: polityka gildii + profil => (blokować?, powód).
//!
//! Kolejność (pierwsze trafienie wygrywa, liczy się dla raportowanego powodu):
//!   premium -> emoji w nazwie -> losowy username -> link w bio -> CAS.
//! I/O robią tylko: bio (pobranie profilu z platformy) i CAS; oba fail-open.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::platform::{Platform, Profile};
use crate::policy::GroupPolicy;
use crate::reputation::ReputationLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    PremiumUser,
    EmojiName,
    RandomUsername,
    BioLink,
    CasBlacklisted,
}

impl Reason {
    /// Kod powodu – zapisywany w historii banów i używany jako klucz tłumaczenia.
    pub fn code(self) -> &'static str {
        match self {
            Reason::PremiumUser => "reason_premium_user",
            Reason::EmojiName => "reason_emoji_name",
            Reason::RandomUsername => "reason_random_username",
            Reason::BioLink => "reason_bio_link",
            Reason::CasBlacklisted => "reason_cas_blacklisted",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        [
            Reason::PremiumUser,
            Reason::EmojiName,
            Reason::RandomUsername,
            Reason::BioLink,
            Reason::CasBlacklisted,
        ]
        .into_iter()
        .find(|r| r.code() == code)
    }

    /// Powody, które user może sam naprawić w profilu (self-unban).
    pub fn is_self_fixable(self) -> bool {
        matches!(self, Reason::EmojiName | Reason::RandomUsername | Reason::BioLink)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub restrict: bool,
    pub reason: Option<Reason>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            restrict: false,
            reason: None,
        }
    }

    pub fn restrict(reason: Reason) -> Self {
        Self {
            restrict: true,
            reason: Some(reason),
        }
    }

    /// Kod powodu albo "" dla braku trafienia.
    pub fn reason_code(&self) -> &'static str {
        self.reason.map(Reason::code).unwrap_or("")
    }
}

/* ==============================
   Heurystyki (czyste funkcje)
   ============================== */

static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "[",
        r"\x{1F300}-\x{1F5FF}", // symbole i piktogramy
        r"\x{1F600}-\x{1F64F}", // emotikony
        r"\x{1F680}-\x{1F6FF}", // transport/mapy
        r"\x{1F700}-\x{1F77F}",
        r"\x{1F780}-\x{1F7FF}",
        r"\x{1F800}-\x{1F8FF}",
        r"\x{1F900}-\x{1F9FF}",
        r"\x{1FA00}-\x{1FAFF}",
        r"\x{1F1E6}-\x{1F1FF}", // flagi
        r"\x{2600}-\x{26FF}",
        r"\x{2700}-\x{27BF}",
        "]"
    ))
    .unwrap()
});

static RE_RANDOM_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[bcdfghjklmnpqrstvwxyz]{5,}|[0-9]{7,}").unwrap());

/// Literalne fragmenty traktowane jako link w bio.
const BIO_LINK_NEEDLES: &[&str] = &["http://", "https://", "www.", "t.me/", "discord.gg/", "discord.com/invite"];

pub fn has_emoji_name(profile: &Profile) -> bool {
    RE_EMOJI.is_match(&profile.first_name)
        || profile
            .last_name
            .as_deref()
            .map(|l| RE_EMOJI.is_match(l))
            .unwrap_or(false)
}

/// >=5 spółgłosek pod rząd albo >=7 cyfr pod rząd (po lowercase). Heurystyka, nie model.
pub fn is_random_username(username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    RE_RANDOM_HANDLE.is_match(&username.to_lowercase())
}

pub fn bio_has_link(bio: &str) -> bool {
    let lower = bio.to_lowercase();
    BIO_LINK_NEEDLES.iter().any(|n| lower.contains(n))
}

/* ==============================
   Klasyfikator
   ============================== */

pub struct Classifier {
    platform: Arc<dyn Platform>,
    reputation: Option<Arc<ReputationLookup>>,
}

impl Classifier {
    /// `reputation = None` => CAS wyłączony globalnie (flaga gildii nic nie zmienia).
    pub fn new(platform: Arc<dyn Platform>, reputation: Option<Arc<ReputationLookup>>) -> Self {
        Self { platform, reputation }
    }

    pub async fn classify(&self, policy: &GroupPolicy, profile: &Profile) -> Verdict {
        if policy.restrict_premium && profile.is_premium {
            return Verdict::restrict(Reason::PremiumUser);
        }

        if policy.restrict_emoji_name && has_emoji_name(profile) {
            return Verdict::restrict(Reason::EmojiName);
        }

        if policy.restrict_random_username {
            if let Some(handle) = profile.username.as_deref() {
                if is_random_username(handle) {
                    return Verdict::restrict(Reason::RandomUsername);
                }
            }
        }

        if policy.restrict_bio_link && self.bio_link_check(profile.id).await {
            return Verdict::restrict(Reason::BioLink);
        }

        if policy.use_reputation {
            if let Some(rep) = &self.reputation {
                return rep.check(profile.id).await;
            }
        }

        Verdict::allow()
    }

    /// Zawsze świeże bio z platformy; błąd => brak trafienia.
    async fn bio_link_check(&self, user_id: u64) -> bool {
        match self.platform.get_profile(user_id).await {
            Ok(p) => p.bio.as_deref().map(bio_has_link).unwrap_or(false),
            Err(e) => {
                warn!(error=?e, uid = user_id, "profile fetch for bio check failed (fail-open)");
                false
            }
        }
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("reputation", &self.reputation.is_some())
            .finish()
    }
}
