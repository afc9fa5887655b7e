//! Selection → trigger → popup flows driven through the controller.

use seltrans::config::Settings;
use seltrans::lang::Direction;
use seltrans::popup::{
    Controller, Effect, Event, EventPath, Listener, ListenerRegistry, Outcome, Phase, Region, Status,
    COPIED_RESET, OUTSIDE_CLICK_SETTLE,
};
use seltrans::relay::TranslationResult;
use seltrans::widgets::{Bounds, Point, HANDLE_HEIGHT};
use std::time::{Duration, Instant};

fn settings() -> Settings {
    Settings { api_key: "sk-test".into(), ..Settings::default() }
}

struct Host {
    controller: Controller,
    listeners: ListenerRegistry,
    translations: Vec<(u64, String)>,
    copies: Vec<String>,
}

impl Host {
    fn mount(settings: Settings) -> Self {
        let (controller, fx) = Controller::new(settings);
        let mut host = Self { controller, listeners: ListenerRegistry::default(), translations: vec![], copies: vec![] };
        host.apply(fx);
        host
    }

    fn send(&mut self, event: Event) {
        let fx = self.controller.handle(event);
        self.apply(fx);
    }

    fn apply(&mut self, fx: Vec<Effect>) {
        for effect in fx {
            if self.listeners.apply(&effect) {
                continue;
            }
            match effect {
                Effect::Translate { id, request } => self.translations.push((id, request.text)),
                Effect::CopyToClipboard(text) => self.copies.push(text),
                Effect::Listen(_) | Effect::Unlisten(_) => unreachable!(),
            }
        }
    }

    fn select(&mut self, text: &str) {
        self.send(Event::SelectionChanged {
            selection: Some((text.to_string(), Bounds::new(40.0, 100.0, 120.0, 18.0))),
            path: EventPath::page(),
        });
    }

    fn last_request(&self) -> u64 {
        self.translations.last().expect("a translation was requested").0
    }
}

#[test]
fn select_translate_close_round_trip() {
    let mut host = Host::mount(settings());
    host.select("hello world");
    assert_eq!(host.controller.status(), Status::ButtonVisible);
    match host.controller.phase() {
        Phase::ButtonVisible(sel) => {
            assert_eq!(sel.text, "hello world");
            assert_eq!(sel.direction, Direction::ToChinese);
            assert_eq!(sel.anchor.y, 118.0 + seltrans::popup::ANCHOR_GAP);
        }
        other => panic!("unexpected phase {:?}", other),
    }

    host.send(Event::TriggerActivated);
    assert_eq!(host.controller.status(), Status::Translating);
    assert_eq!(host.translations, vec![(1, "hello world".to_string())]);

    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("你好世界") });
    assert_eq!(host.controller.status(), Status::ResultVisible(Outcome::Done));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.translated_text(), "你好世界");
    assert!(!p.copied);

    host.send(Event::Close);
    assert_eq!(host.controller.status(), Status::Idle);
    assert_eq!(host.controller.phase(), &Phase::Idle);
}

#[test]
fn reopened_popup_starts_from_defaults() {
    let mut host = Host::mount(settings());
    host.select("first");
    host.send(Event::TriggerActivated);
    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("一") });
    host.send(Event::ToggleSource);
    host.send(Event::ToggleTranslation);
    host.send(Event::Copy);
    host.send(Event::CopyFinished { ok: true, at: Instant::now() });
    host.send(Event::Close);

    host.select("second");
    host.send(Event::TriggerActivated);
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.translated_text(), "");
    assert_eq!(p.error(), None);
    assert!(!p.copied);
    assert!(!p.source_expanded);
    assert!(!p.translation_expanded);
    assert!(p.is_loading());
}

#[test]
fn failure_is_shown_inline() {
    let mut host = Host::mount(Settings { api_key: String::new(), ..Settings::default() });
    host.select("hello");
    host.send(Event::TriggerActivated);
    let id = host.last_request();
    host.send(Event::RelayResponded { id, result: TranslationResult::failed("缺少API密钥配置") });

    assert_eq!(host.controller.status(), Status::ResultVisible(Outcome::Error));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.error(), Some("缺少API密钥配置"));
    host.send(Event::Copy);
    assert!(host.copies.is_empty());
}

#[test]
fn stale_reply_after_close_is_dropped() {
    let mut host = Host::mount(settings());
    host.select("slow one");
    host.send(Event::TriggerActivated);
    let stale = host.last_request();
    host.send(Event::Close);

    host.select("fast one");
    host.send(Event::TriggerActivated);
    let current = host.last_request();
    assert_ne!(stale, current);

    host.send(Event::RelayResponded { id: stale, result: TranslationResult::succeeded("old") });
    assert_eq!(host.controller.status(), Status::Translating);

    host.send(Event::RelayResponded { id: current, result: TranslationResult::succeeded("new") });
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.translated_text(), "new");
}

#[test]
fn reply_while_idle_changes_nothing() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.send(Event::Close);
    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("late") });
    assert_eq!(host.controller.status(), Status::Idle);
}

#[test]
fn clearing_selection_hides_button() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::SelectionChanged { selection: None, path: EventPath::page() });
    assert_eq!(host.controller.status(), Status::Idle);

    host.select("text");
    host.send(Event::SelectionChanged {
        selection: Some(("   ".into(), Bounds::default())),
        path: EventPath::page(),
    });
    assert_eq!(host.controller.status(), Status::Idle);
}

#[test]
fn selection_is_ignored_while_popup_open() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.select("another");
    host.send(Event::SelectionChanged { selection: None, path: EventPath::page() });
    assert_eq!(host.controller.status(), Status::Translating);
    assert_eq!(host.translations.len(), 1);
}

#[test]
fn clicks_on_trigger_or_popup_are_not_outside_clicks() {
    let mut host = Host::mount(settings());
    let t0 = Instant::now();
    host.select("text");
    host.send(Event::PointerDown { path: EventPath::through(Region::Trigger), at: t0 });
    host.send(Event::SelectionChanged { selection: None, path: EventPath::through(Region::Trigger) });
    assert_eq!(host.controller.status(), Status::ButtonVisible);

    host.send(Event::TriggerActivated);
    host.send(Event::PointerDown { path: EventPath::through(Region::Popup), at: t0 });
    assert_eq!(host.controller.status(), Status::Translating);
}

#[test]
fn outside_click_dismisses_button_once_per_pass() {
    let mut host = Host::mount(settings());
    let t0 = Instant::now();
    host.select("text");
    host.send(Event::PointerDown { path: EventPath::page(), at: t0 });
    assert_eq!(host.controller.status(), Status::Idle);

    // A burst inside the settle window is a single pass.
    host.select("text");
    for ms in [5, 10, 20, 50] {
        host.send(Event::PointerDown { path: EventPath::page(), at: t0 + Duration::from_millis(ms) });
    }
    assert_eq!(host.controller.status(), Status::ButtonVisible);

    host.send(Event::PointerDown { path: EventPath::page(), at: t0 + OUTSIDE_CLICK_SETTLE });
    assert_eq!(host.controller.status(), Status::Idle);
}

#[test]
fn outside_click_leaves_popup_open() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.send(Event::PointerDown { path: EventPath::page(), at: Instant::now() });
    assert_eq!(host.controller.status(), Status::Translating);
}

#[test]
fn disabling_hides_everything_and_detaches() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.send(Event::DragPressed {
        pointer: Point::new(45.0, 125.0),
        bounds: Bounds::new(40.0, 123.0, 360.0, 200.0),
    });
    assert!(host.listeners.is_listening(Listener::DragMotion));

    host.send(Event::SettingsChanged(Settings { enabled: false, ..settings() }));
    assert_eq!(host.controller.status(), Status::Disabled);
    assert_eq!(host.listeners.active_count(), 0);

    // Events from a stale host are dropped.
    host.select("text");
    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("late") });
    assert_eq!(host.controller.status(), Status::Disabled);

    host.send(Event::SettingsChanged(settings()));
    assert_eq!(host.controller.status(), Status::Idle);
    assert!(host.listeners.is_listening(Listener::Selection));
    assert!(host.listeners.is_listening(Listener::OutsideClick));
    assert!(!host.listeners.is_listening(Listener::DragMotion));
}

#[test]
fn repeated_enable_disable_does_not_leak_listeners() {
    let mut host = Host::mount(settings());
    for _ in 0..5 {
        host.send(Event::SettingsChanged(Settings { enabled: false, ..settings() }));
        host.send(Event::SettingsChanged(Settings { enabled: false, ..settings() }));
        host.send(Event::SettingsChanged(settings()));
        host.send(Event::SettingsChanged(settings()));
    }
    assert_eq!(host.listeners.active_count(), 2);
    assert_eq!(host.listeners.attach_count(), 12);
    assert_eq!(host.listeners.detach_count(), 10);

    let fx = host.controller.teardown();
    host.apply(fx);
    assert_eq!(host.listeners.active_count(), 0);
    host.send(Event::SettingsChanged(settings()));
    assert_eq!(host.listeners.active_count(), 0);
}

#[test]
fn request_uses_settings_snapshot_at_trigger_time() {
    let mut host = Host::mount(settings());
    host.select("text");
    let fx = host.controller.handle(Event::TriggerActivated);
    host.send(Event::SettingsChanged(Settings { api_key: "rotated".into(), ..settings() }));

    let Some(Effect::Translate { request, .. }) = fx.into_iter().next() else { panic!("translate effect") };
    assert_eq!(request.api_config.api_key, "sk-test");
    assert_eq!(host.controller.status(), Status::Translating);
}

#[test]
fn trigger_label_matches_request_direction() {
    for text in ["今天天气很好", "good morning", "mixed 中文 text", "こんにちは"] {
        let mut host = Host::mount(settings());
        host.select(text);
        let Phase::ButtonVisible(sel) = host.controller.phase() else { panic!("button expected") };
        let label_dir = sel.direction;
        let fx = host.controller.handle(Event::TriggerActivated);
        let Some(Effect::Translate { request, .. }) = fx.into_iter().next() else { panic!("translate effect") };
        assert_eq!(Direction::detect(&request.text), label_dir, "{text}");
    }
}

#[test]
fn drag_moves_popup_by_handle_only() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    let start = p.position;
    let bounds = Bounds::new(start.x, start.y, 360.0, 240.0);

    // Body press: no drag.
    host.send(Event::DragPressed { pointer: Point::new(start.x + 10.0, start.y + HANDLE_HEIGHT + 20.0), bounds });
    assert!(!host.listeners.is_listening(Listener::DragMotion));
    host.send(Event::DragMoved(Point::new(500.0, 500.0)));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.position, start);

    host.send(Event::DragPressed { pointer: Point::new(start.x + 10.0, start.y + 5.0), bounds });
    assert!(host.listeners.is_listening(Listener::DragMotion));
    host.send(Event::DragMoved(Point::new(300.0, 250.0)));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.position, Point::new(290.0, 245.0));
    assert!(p.drag.is_dragging());

    host.send(Event::DragReleased);
    assert!(!host.listeners.is_listening(Listener::DragMotion));
    host.send(Event::DragMoved(Point::new(0.0, 0.0)));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert_eq!(p.position, Point::new(290.0, 245.0));
}

#[test]
fn copied_mark_resets_after_a_while() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("文本") });
    host.send(Event::Copy);
    assert_eq!(host.copies, vec!["文本".to_string()]);

    let t0 = Instant::now();
    host.send(Event::CopyFinished { ok: true, at: t0 });
    host.send(Event::Tick(t0 + Duration::from_millis(500)));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert!(p.copied);

    host.send(Event::Tick(t0 + COPIED_RESET));
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert!(!p.copied);
}

#[test]
fn failed_copy_does_not_mark_copied() {
    let mut host = Host::mount(settings());
    host.select("text");
    host.send(Event::TriggerActivated);
    host.send(Event::RelayResponded { id: 1, result: TranslationResult::succeeded("文本") });
    host.send(Event::CopyFinished { ok: false, at: Instant::now() });
    let Phase::Popup(p) = host.controller.phase() else { panic!("popup expected") };
    assert!(!p.copied);
}
