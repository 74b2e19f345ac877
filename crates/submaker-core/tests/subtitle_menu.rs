//! Subtitle menu flows driven end to end with fixture payloads.

use submaker_config::{AddonContext, TranslationSettings};
use submaker_core::{
    FetchPurpose, HttpReply, InventoryLoadOptions, MenuEffect, MenuTimer, SubtitleMenu,
    TimerCommand, TranslationStatus,
};
use submaker_test_support::fixtures::{
    BASE_URL, CONFIG, cached_entry, episode_one, episode_two, subtitle_list_json,
    translatable_entry,
};

fn menu() -> SubtitleMenu {
    SubtitleMenu::new(
        AddonContext::new(CONFIG, BASE_URL),
        &TranslationSettings::default(),
        episode_two(),
    )
}

fn inventory_fetch(effects: &[MenuEffect]) -> (u64, String) {
    effects
        .iter()
        .find_map(|effect| match effect {
            MenuEffect::FetchInventory { ticket, url } => Some((*ticket, url.clone())),
            _ => None,
        })
        .expect("inventory fetch")
}

fn translation_fetch(effects: &[MenuEffect]) -> (u64, String) {
    effects
        .iter()
        .find_map(|effect| match effect {
            MenuEffect::FetchTranslation {
                ticket,
                url,
                purpose: FetchPurpose::Status,
                ..
            } => Some((*ticket, url.clone())),
            _ => None,
        })
        .expect("translation fetch")
}

#[test]
fn concurrent_loads_share_one_request() {
    let mut menu = menu();
    let first = menu
        .load_subtitle_inventory(InventoryLoadOptions::default())
        .expect("first load");
    let second = menu
        .load_subtitle_inventory(InventoryLoadOptions { force: true })
        .expect("second load");

    let (_, url) = inventory_fetch(&first);
    assert_eq!(
        url,
        format!("{BASE_URL}/addon/{CONFIG}/subtitles/series/tt123%3A1%3A2.json?filename=ep2.mkv")
    );
    assert!(second.is_empty(), "second caller joins the running request");
    let fetches = first
        .iter()
        .chain(&second)
        .filter(|effect| matches!(effect, MenuEffect::FetchInventory { .. }))
        .count();
    assert_eq!(fetches, 1);
}

#[test]
fn translate_poll_and_complete() {
    let mut menu = menu();
    let (ticket, _) = inventory_fetch(
        &menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load"),
    );
    let body = subtitle_list_json(&[translatable_entry("42", "spa"), translatable_entry("43", "fre")]);
    menu.on_inventory_result(ticket, Ok(HttpReply::new(200, body)), 0);
    assert_eq!(menu.translations().len(), 2);

    let (ticket, url) = translation_fetch(&menu.handle_translation_button_click("42", 10));
    assert!(url.ends_with("/translate/42/spa.srt"));

    let waiting = menu.on_translation_reply("42", ticket, Ok(HttpReply::new(202, "")), 20);
    assert!(waiting.contains(&MenuEffect::Timer(TimerCommand::Arm {
        key: MenuTimer::TranslationPoll("42".into()),
        delay_ms: 3_500
    })));

    let (ticket, _) = translation_fetch(&menu.on_timer(&MenuTimer::TranslationPoll("42".into()), 3_520));
    let done = menu.on_translation_reply(
        "42",
        ticket,
        Ok(HttpReply::new(200, "1\n00:00:01,000 --> 00:00:02,000\nHola\n")),
        3_600,
    );
    assert!(done.contains(&MenuEffect::ActionChanged { id: "42".into() }));
    let action = menu.translations().get("42").expect("action");
    assert_eq!(action.status, TranslationStatus::Ready);
    assert_eq!(action.filename, "abcd1234_spa_translated.srt");
    assert_eq!(
        menu.translations().get("43").map(|a| a.status),
        Some(TranslationStatus::Idle)
    );
}

#[test]
fn reload_reconciles_with_server_cache() {
    let mut menu = menu();
    let (ticket, _) = inventory_fetch(
        &menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load"),
    );
    let body = subtitle_list_json(&[translatable_entry("42", "spa"), translatable_entry("43", "fre")]);
    menu.on_inventory_result(ticket, Ok(HttpReply::new(200, body)), 0);

    // Another tab finished the Spanish translation; the French entry is gone.
    let (ticket, _) = inventory_fetch(
        &menu
            .load_subtitle_inventory(InventoryLoadOptions { force: true })
            .expect("reload"),
    );
    let body = subtitle_list_json(&[translatable_entry("42", "spa"), cached_entry("42", "spa")]);
    let effects = menu.on_inventory_result(ticket, Ok(HttpReply::new(200, body)), 5_000);

    assert!(effects.contains(&MenuEffect::ActionRemoved { id: "43".into() }));
    let spanish = menu.translations().get("42").expect("spanish");
    assert_eq!(spanish.status, TranslationStatus::Ready);
    assert!(spanish.download_url.contains("translate_cache"));
    assert!(matches!(effects.last(), Some(MenuEffect::InventoryReady(snapshot)) if snapshot.items.len() == 2));
}

#[test]
fn switching_streams_discards_previous_state() {
    let mut menu = menu();
    let (ticket, _) = inventory_fetch(
        &menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load"),
    );
    menu.on_inventory_result(
        ticket,
        Ok(HttpReply::new(200, subtitle_list_json(&[translatable_entry("42", "spa")]))),
        0,
    );
    let (ticket, _) = translation_fetch(&menu.handle_translation_button_click("42", 1));
    menu.on_translation_reply("42", ticket, Ok(HttpReply::new(202, "")), 2);
    assert!(menu.pending_timers() > 0);

    menu.reset_for_stream(episode_one());
    assert_eq!(menu.pending_timers(), 0);
    assert!(menu.translations().is_empty());

    let (_, url) = inventory_fetch(
        &menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load"),
    );
    assert!(url.contains("tt123%3A1%3A1"));
    assert!(menu.on_translation_reply("42", ticket, Ok(HttpReply::new(200, "late")), 10).is_empty());
}
