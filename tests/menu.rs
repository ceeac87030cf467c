mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakePlatform, interaction, settings};
use tigris_gatekeeper::engine::{CallbackEvent, Engine};
use tigris_gatekeeper::i18n::translate;
use tigris_gatekeeper::menu::INPUT_TTL;
use tigris_gatekeeper::platform::{MessageRef, Target};
use tigris_gatekeeper::store::{MemoryStore, Store};

const GROUP: u64 = 100;
const ADMIN: u64 = 1;
const MENU: MessageRef = MessageRef {
    chat_id: ADMIN,
    message_id: 500,
};

fn engine(platform: Arc<FakePlatform>) -> Engine {
    engine_with(platform, Arc::new(MemoryStore::new()))
}

fn engine_with(platform: Arc<FakePlatform>, store: Arc<MemoryStore>) -> Engine {
    Engine::new(&settings(), platform, store).unwrap()
}

fn tap(user_id: u64, data: &str) -> CallbackEvent {
    CallbackEvent {
        interaction: interaction(),
        user_id,
        data: data.to_string(),
        message: Some(MENU),
    }
}

#[tokio::test]
async fn settings_command_lists_administered_groups() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());
    engine.on_group_seen(GROUP).await;

    engine.on_settings_command(ADMIN).await.unwrap();

    let sent = platform.sent();
    assert_eq!(sent.len(), 1);
    let (target, text, kb) = &sent[0];
    assert_eq!(*target, Target::User(ADMIN));
    assert_eq!(text, &translate("en", "menu_groups"));
    assert_eq!(kb[0][0].token, "group:100");
    assert_eq!(kb[0][0].label, "Group 100");
    assert_eq!(kb.last().unwrap()[0].token, "group:input");
}

#[tokio::test]
async fn settings_command_without_groups_offers_id_input() {
    let platform = FakePlatform::new();
    let engine = engine(platform.clone());

    engine.on_settings_command(ADMIN).await.unwrap();

    let (_, text, kb) = &platform.sent()[0];
    assert_eq!(text, &translate("en", "menu_no_groups"));
    assert_eq!(kb.len(), 1);
    assert_eq!(kb[0][0].token, "group:input");
}

#[tokio::test]
async fn forged_token_for_foreign_group_is_denied() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());
    let before = engine.registry().get(GROUP).await;

    engine.on_callback(tap(42, "action:100:premium")).await;
    engine.on_callback(tap(42, "group:100")).await;
    engine.on_callback(tap(42, "lang:100:pl")).await;

    let denied = (translate("en", "menu_denied"), true);
    assert_eq!(platform.answers(), vec![denied.clone(), denied.clone(), denied]);
    assert!(platform.edits().is_empty());
    assert_eq!(engine.registry().get(GROUP).await, before);
}

#[tokio::test]
async fn toggle_flips_flag_and_rerenders() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());
    assert!(!engine.registry().get(GROUP).await.restrict_premium);

    engine.on_callback(tap(ADMIN, "action:100:premium")).await;

    assert!(engine.registry().get(GROUP).await.restrict_premium);
    assert_eq!(platform.answers(), vec![(translate("en", "menu_saved"), false)]);
    let edits = platform.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, MENU);
    assert!(edits[0].2[0][0].label.starts_with('✅'));

    engine.on_callback(tap(ADMIN, "action:100:premium")).await;
    assert!(!engine.registry().get(GROUP).await.restrict_premium);
}

#[tokio::test]
async fn language_select_and_change() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());

    engine.on_callback(tap(ADMIN, "action:100:language")).await;
    let (_, _, kb) = platform.edits().pop().unwrap();
    assert!(kb.iter().flatten().any(|b| b.token == "lang:100:pl"));

    engine.on_callback(tap(ADMIN, "lang:100:pl")).await;
    assert_eq!(engine.registry().get(GROUP).await.language, "pl");
    assert_eq!(platform.answers().last().unwrap().0, translate("pl", "menu_saved"));

    engine.on_callback(tap(ADMIN, "lang:100:xx")).await;
    assert_eq!(engine.registry().get(GROUP).await.language, "pl");
    assert_eq!(
        platform.answers().last().unwrap(),
        &(translate("pl", "menu_unknown_language"), true)
    );
}

#[tokio::test]
async fn back_returns_to_group_select() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());
    engine.on_group_seen(GROUP).await;

    engine.on_callback(tap(ADMIN, "action:100:back")).await;
    let (_, text, kb) = platform.edits().pop().unwrap();
    assert_eq!(text, translate("en", "menu_groups"));
    assert_eq!(kb[0][0].token, "group:100");
}

#[tokio::test]
async fn malformed_token_gets_corrective_answer_unknown_verb_is_ignored() {
    let platform = FakePlatform::new();
    let engine = engine(platform.clone());

    engine.on_callback(tap(ADMIN, "action:abc:premium")).await;
    assert_eq!(platform.answers(), vec![(translate("en", "menu_bad_token"), true)]);

    platform.clear();
    engine.on_callback(tap(ADMIN, "verify:1:2")).await;
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn group_id_input_claims_unowned_group() {
    const NEW_GROUP: u64 = 200;
    let platform = FakePlatform::new();
    // bot ma uprawnienia, ale nikt nie może nadawać ról => admin nieustalony
    platform.members.insert(
        NEW_GROUP,
        vec![common::member(common::BOT, false, false, true), common::member(7, false, false, false)],
    );
    let engine = engine(platform.clone());
    assert_eq!(engine.registry().get(NEW_GROUP).await.admin_id, None);

    engine.on_callback(tap(7, "group:input")).await;
    assert!(engine.menu().is_awaiting_input(7));
    assert_eq!(platform.edits()[0].1, translate("en", "prompt_group_id"));

    // śmieci – slot zostaje
    assert!(engine.menu().on_private_text(7, "my group pls").await);
    assert!(engine.menu().is_awaiting_input(7));
    assert_eq!(platform.sent().last().unwrap().1, translate("en", "prompt_group_id_invalid"));

    assert!(engine.menu().on_private_text(7, " 200 ").await);
    assert!(!engine.menu().is_awaiting_input(7));
    assert_eq!(engine.registry().get(NEW_GROUP).await.admin_id, Some(7));
    let (_, _, kb) = platform.edits().pop().unwrap();
    assert_eq!(kb[0][0].token, "action:200:premium");
}

#[tokio::test]
async fn group_id_input_from_outsider_is_denied() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());

    engine.on_callback(tap(42, "group:input")).await;
    assert!(engine.menu().on_private_text(42, "100").await);

    assert_eq!(platform.sent().last().unwrap().1, translate("en", "menu_denied"));
    assert_eq!(engine.registry().get(GROUP).await.admin_id, Some(ADMIN));
    assert!(!engine.menu().is_awaiting_input(42));
}

#[tokio::test]
async fn private_text_without_prompt_is_not_consumed() {
    let platform = FakePlatform::new();
    let engine = engine(platform.clone());
    assert!(!engine.menu().on_private_text(ADMIN, "hello").await);
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn denied_taps_on_unknown_groups_leave_no_trace() {
    let platform = FakePlatform::new();
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(platform.clone(), store.clone());

    engine.on_callback(tap(42, "action:555:premium")).await;
    engine.on_callback(tap(42, "group:557")).await;
    engine.on_callback(tap(42, "unban:556:9")).await;
    engine.on_callback(tap(9, "self_unban:558:9")).await;

    assert_eq!(
        platform.answers(),
        vec![
            (translate("en", "menu_denied"), true),
            (translate("en", "menu_denied"), true),
            (translate("en", "unban_denied"), true),
            (translate("en", "unban_already"), false),
        ]
    );
    for gid in 555..=558 {
        assert_eq!(engine.registry().cached(gid), None);
        assert_eq!(store.load_policy(gid).await.unwrap(), None);
    }
    assert!(platform.permissions().is_empty());
}

#[tokio::test]
async fn denied_group_id_input_leaves_no_trace() {
    let platform = FakePlatform::new();
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(platform.clone(), store.clone());

    engine.on_callback(tap(42, "group:input")).await;
    assert!(engine.menu().on_private_text(42, "777").await);

    assert_eq!(platform.sent().last().unwrap().1, translate("en", "menu_denied"));
    assert_eq!(engine.registry().cached(777), None);
    assert_eq!(store.load_policy(777).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn unanswered_group_id_prompt_expires() {
    let platform = FakePlatform::new();
    platform.empowered_group(GROUP, ADMIN);
    let engine = engine(platform.clone());

    engine.on_callback(tap(ADMIN, "group:input")).await;
    assert!(engine.menu().is_awaiting_input(ADMIN));

    tokio::time::advance(INPUT_TTL + Duration::from_secs(1)).await;
    assert!(!engine.menu().is_awaiting_input(ADMIN));

    platform.clear();
    // po wygaśnięciu zwykły tekst nie jest już traktowany jako ID
    assert!(!engine.menu().on_private_text(ADMIN, "100").await);
    assert!(platform.calls().is_empty());
    assert_eq!(engine.registry().cached(GROUP), None);
}

#[tokio::test(start_paused = true)]
async fn expired_prompts_are_swept() {
    let platform = FakePlatform::new();
    let engine = engine(platform.clone());

    engine.on_callback(tap(7, "group:input")).await;
    engine.on_callback(tap(8, "group:input")).await;
    tokio::time::advance(INPUT_TTL + Duration::from_secs(1)).await;

    assert_eq!(engine.menu().sweep_pending(), 2);
    assert_eq!(engine.menu().sweep_pending(), 0);
}
