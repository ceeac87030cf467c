//! Teksty UI (menu ustawień, powiadomienia, odpowiedzi na przyciski).
//! `translate(lang, key)`: język -> domyślny (`en`) -> surowy klucz.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const DEFAULT_LANG: &str = "en";

/// (kod, nazwa wyświetlana w menu)
pub const SUPPORTED: &[(&str, &str)] = &[("en", "English"), ("pl", "Polski"), ("ru", "Русский")];

type Table = HashMap<&'static str, &'static str>;

static EN: &[(&str, &str)] = &[
    ("reason_premium_user", "premium account"),
    ("reason_emoji_name", "emoji in display name"),
    ("reason_random_username", "random-looking username"),
    ("reason_bio_link", "link in profile bio"),
    ("reason_cas_blacklisted", "listed in the CAS anti-spam registry"),
    ("notify_restricted", "🚫 {user} was restricted in **{group}**.\nReason: {reason}"),
    ("notice_self_unban", "🚫 {user} was restricted ({reason}). Fixed your profile? Press the button below."),
    ("btn_unban", "✅ Unban"),
    ("btn_self_unban", "🙋 I fixed my profile"),
    ("unban_done", "✅ User unbanned."),
    ("unban_already", "ℹ️ This user is not restricted."),
    ("unban_failed", "⚠️ Could not lift the restriction, try again later."),
    ("unban_denied", "⛔ Only an admin of this group can do that."),
    ("unban_edited", "✅ {user} was unbanned by {actor}."),
    ("self_unban_not_you", "⛔ This button is not for you."),
    ("self_unban_still", "⛔ Your profile still matches: {reason}."),
    ("menu_groups", "⚙️ Pick a group to configure:"),
    ("menu_no_groups", "⚙️ You don't administer any known group yet. Enter a group ID to link one."),
    ("menu_actions", "⚙️ Settings for **{group}**"),
    ("menu_languages", "🌐 Language for **{group}**"),
    ("menu_denied", "⛔ You are not an admin of this group."),
    ("menu_saved", "✅ Saved."),
    ("menu_bad_token", "⚠️ This button is outdated. Open /settings again."),
    ("menu_unknown_language", "⚠️ Unknown language."),
    ("btn_enter_group_id", "🔢 Enter group ID"),
    ("btn_back", "⬅️ Back"),
    ("btn_language", "🌐 Language"),
    ("toggle_premium", "Restrict premium"),
    ("toggle_emoji", "Emoji in name"),
    ("toggle_random_username", "Random username"),
    ("toggle_bio_link", "Link in bio"),
    ("toggle_cas", "CAS lookup"),
    ("toggle_notify", "Notify me"),
    ("prompt_group_id", "🔢 Send the numeric ID of the group."),
    ("prompt_group_id_invalid", "⚠️ That is not a group ID. Send digits only, e.g. 123456789012345678."),
    ("settings_sent", "📬 Settings menu sent in DM."),
    ("settings_dm_failed", "⚠️ I can't DM you. Enable direct messages from server members."),
];

static PL: &[(&str, &str)] = &[
    ("reason_premium_user", "konto premium"),
    ("reason_emoji_name", "emoji w nazwie"),
    ("reason_random_username", "losowo wyglądająca nazwa"),
    ("reason_bio_link", "link w bio"),
    ("reason_cas_blacklisted", "wpis w rejestrze antyspamowym CAS"),
    ("notify_restricted", "🚫 {user} został(a) ograniczony(a) na **{group}**.\nPowód: {reason}"),
    ("notice_self_unban", "🚫 {user} został(a) ograniczony(a) ({reason}). Poprawiłeś profil? Kliknij przycisk."),
    ("btn_unban", "✅ Odbanuj"),
    ("btn_self_unban", "🙋 Poprawiłem profil"),
    ("unban_done", "✅ Użytkownik odbanowany."),
    ("unban_already", "ℹ️ Ten użytkownik nie ma ograniczeń."),
    ("unban_failed", "⚠️ Nie udało się zdjąć ograniczenia, spróbuj później."),
    ("unban_denied", "⛔ Tylko admin tej gildii może to zrobić."),
    ("unban_edited", "✅ {user} odbanowany(a) przez {actor}."),
    ("self_unban_not_you", "⛔ Ten przycisk nie jest dla Ciebie."),
    ("self_unban_still", "⛔ Twój profil nadal pasuje: {reason}."),
    ("menu_groups", "⚙️ Wybierz gildię do konfiguracji:"),
    ("menu_no_groups", "⚙️ Nie administrujesz jeszcze żadną znaną gildią. Podaj ID gildii, aby ją podpiąć."),
    ("menu_actions", "⚙️ Ustawienia dla **{group}**"),
    ("menu_languages", "🌐 Język dla **{group}**"),
    ("menu_denied", "⛔ Nie jesteś adminem tej gildii."),
    ("menu_saved", "✅ Zapisano."),
    ("menu_bad_token", "⚠️ Ten przycisk jest nieaktualny. Otwórz /settings ponownie."),
    ("menu_unknown_language", "⚠️ Nieznany język."),
    ("btn_enter_group_id", "🔢 Podaj ID gildii"),
    ("btn_back", "⬅️ Wstecz"),
    ("btn_language", "🌐 Język"),
    ("toggle_premium", "Blokuj premium"),
    ("toggle_emoji", "Emoji w nazwie"),
    ("toggle_random_username", "Losowa nazwa"),
    ("toggle_bio_link", "Link w bio"),
    ("toggle_cas", "Sprawdzanie CAS"),
    ("toggle_notify", "Powiadomienia"),
    ("prompt_group_id", "🔢 Wyślij numeryczne ID gildii."),
    ("prompt_group_id_invalid", "⚠️ To nie jest ID gildii. Wyślij same cyfry, np. 123456789012345678."),
    ("settings_sent", "📬 Menu ustawień wysłane w DM."),
    ("settings_dm_failed", "⚠️ Nie mogę napisać do Ciebie DM. Włącz wiadomości od członków serwera."),
];

static RU: &[(&str, &str)] = &[
    ("reason_premium_user", "премиум-аккаунт"),
    ("reason_emoji_name", "эмодзи в имени"),
    ("reason_random_username", "случайное имя пользователя"),
    ("reason_bio_link", "ссылка в описании профиля"),
    ("reason_cas_blacklisted", "в реестре антиспама CAS"),
    ("notify_restricted", "🚫 {user} ограничен(а) в **{group}**.\nПричина: {reason}"),
    ("btn_unban", "✅ Разбанить"),
    ("unban_done", "✅ Пользователь разбанен."),
    ("unban_already", "ℹ️ У пользователя нет ограничений."),
    ("unban_denied", "⛔ Только администратор группы может это сделать."),
    ("menu_groups", "⚙️ Выберите группу для настройки:"),
    ("menu_actions", "⚙️ Настройки **{group}**"),
    ("menu_denied", "⛔ Вы не администратор этой группы."),
    ("menu_saved", "✅ Сохранено."),
    ("btn_back", "⬅️ Назад"),
    ("btn_language", "🌐 Язык"),
];

static TABLES: Lazy<HashMap<&'static str, Table>> = Lazy::new(|| {
    HashMap::from([
        ("en", EN.iter().copied().collect::<Table>()),
        ("pl", PL.iter().copied().collect::<Table>()),
        ("ru", RU.iter().copied().collect::<Table>()),
    ])
});

pub fn is_supported(lang: &str) -> bool {
    SUPPORTED.iter().any(|(code, _)| *code == lang)
}

pub fn translate(lang: &str, key: &str) -> String {
    TABLES
        .get(lang)
        .and_then(|t| t.get(key))
        .or_else(|| TABLES.get(DEFAULT_LANG).and_then(|t| t.get(key)))
        .map(|s| s.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// `translate` + podstawienie `{nazwa}` -> wartość.
pub fn translate_with(lang: &str, key: &str, vars: &[(&str, &str)]) -> String {
    let mut out = translate(lang, key);
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_then_key() {
        assert_eq!(translate("pl", "btn_back"), "⬅️ Wstecz");
        // brak w RU -> EN
        assert_eq!(translate("ru", "btn_self_unban"), "🙋 I fixed my profile");
        // nieznany język -> EN
        assert_eq!(translate("xx", "menu_saved"), "✅ Saved.");
        // nieznany klucz -> klucz
        assert_eq!(translate("en", "no_such_key"), "no_such_key");
    }

    #[test]
    fn substitutes_placeholders() {
        let s = translate_with("en", "unban_edited", &[("user", "<@1>"), ("actor", "<@2>")]);
        assert_eq!(s, "✅ <@1> was unbanned by <@2>.");
    }

    #[test]
    fn every_language_has_reason_texts() {
        for (code, _) in SUPPORTED {
            for key in ["reason_premium_user", "reason_cas_blacklisted"] {
                assert_ne!(translate(code, key), key, "{code} missing {key}");
            }
        }
    }
}
