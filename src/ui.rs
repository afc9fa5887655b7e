use crate::config::{ModelPreset, Settings, SettingsStore};
use crate::popup::{Controller, Effect, Event, EventPath, Listener, ListenerRegistry, Phase, Popup, PopupStatus, Region};
use crate::relay::{RelayHandle, TranslationResult};
use crate::widgets::{Bounds, Collapsible, Point};
use crossbeam_channel::Receiver;
use eframe::egui;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SOURCE_ROWS: usize = 3;
const TRANSLATION_ROWS: usize = 8;
const POPUP_WIDTH: f32 = 360.0;
const ERROR_RED: egui::Color32 = egui::Color32::from_rgb(0xd9, 0x3f, 0x3f);

pub const SAMPLE_PAGE: &str = "\
Select any part of this page and a small button appears under the selection. \
Press it to open the translation popup; drag the popup by its title bar.

Rust is a multi-paradigm, general-purpose programming language that emphasizes \
performance, type safety, and concurrency.

Rust 是一门注重性能、类型安全和并发的通用编程语言。它在没有垃圾回收器的情况下保证内存安全。

Open Settings to enter the API key. Text containing Chinese characters is translated \
into English, everything else into Chinese.
";

fn to_point(p: egui::Pos2) -> Point {
    Point::new(p.x, p.y)
}

fn to_pos(p: Point) -> egui::Pos2 {
    egui::pos2(p.x, p.y)
}

fn to_bounds(r: egui::Rect) -> Bounds {
    Bounds::new(r.min.x, r.min.y, r.width(), r.height())
}

/// Pointer state for one frame.
#[derive(Debug, Clone, Copy)]
struct PointerInput {
    pos: egui::Pos2,
    pressed: bool,
    released: bool,
}

/// Regions under `pos`, innermost first; the page is always last.
fn path_through(pos: egui::Pos2, trigger: Option<egui::Rect>, popup: Option<egui::Rect>) -> EventPath {
    let mut regions = Vec::new();
    if trigger.is_some_and(|r| r.contains(pos)) {
        regions.push(Region::Trigger);
    }
    if popup.is_some_and(|r| r.contains(pos)) {
        regions.push(Region::Popup);
    }
    regions.push(Region::Page);
    EventPath::new(regions)
}

/// Turns raw pointer input into events for whichever listeners are installed.
fn pointer_events(
    input: PointerInput,
    trigger: Option<egui::Rect>,
    popup: Option<egui::Rect>,
    listeners: &ListenerRegistry,
    selection: Option<(String, Bounds)>,
    at: Instant,
) -> Vec<Event> {
    let mut events = Vec::new();
    let pos = input.pos;
    let path = path_through(pos, trigger, popup);

    if input.pressed {
        if listeners.is_listening(Listener::OutsideClick) {
            events.push(Event::PointerDown { path: path.clone(), at });
        }
        if let Some(rect) = popup.filter(|r| r.contains(pos)) {
            events.push(Event::DragPressed { pointer: to_point(pos), bounds: to_bounds(rect) });
        }
    }
    if listeners.is_listening(Listener::DragMotion) {
        events.push(Event::DragMoved(to_point(pos)));
        if input.released {
            events.push(Event::DragReleased);
        }
    }
    if input.released && listeners.is_listening(Listener::Selection) {
        events.push(Event::SelectionChanged { selection, path });
    }
    events
}

pub struct TranslatorApp {
    controller: Controller,
    listeners: ListenerRegistry,
    relay: RelayHandle,
    store: Arc<SettingsStore>,
    settings_rx: Receiver<Settings>,
    page: String,
    clipboard: Option<arboard::Clipboard>,
    trigger_rect: Option<egui::Rect>,
    popup_rect: Option<egui::Rect>,
    settings_open: bool,
    draft: Settings,
    form_error: Option<String>,
    fonts_set: bool,
}

impl TranslatorApp {
    pub fn new(store: Arc<SettingsStore>, relay: RelayHandle, page: String) -> Self {
        let settings_rx = store.subscribe();
        let settings = store.get();
        let (controller, fx) = Controller::new(settings.clone());
        let clipboard = match arboard::Clipboard::new() {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("clipboard unavailable: {}", e);
                None
            }
        };
        let mut app = Self {
            controller,
            listeners: ListenerRegistry::default(),
            relay,
            store,
            settings_rx,
            page,
            clipboard,
            trigger_rect: None,
            popup_rect: None,
            settings_open: false,
            draft: settings,
            form_error: None,
            fonts_set: false,
        };
        app.apply(fx);
        app
    }

    fn dispatch(&mut self, event: Event) {
        let fx = self.controller.handle(event);
        self.apply(fx);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            if self.listeners.apply(&effect) {
                continue;
            }
            match effect {
                Effect::Translate { id, request } => {
                    if !self.relay.submit(id, request) {
                        log::error!("relay worker gone, request {} dropped", id);
                        self.dispatch(Event::RelayResponded {
                            id,
                            result: TranslationResult::failed("翻译服务不可用"),
                        });
                    }
                }
                Effect::CopyToClipboard(text) => {
                    let ok = self.clipboard.as_mut().map(|c| c.set_text(text).is_ok()).unwrap_or(false);
                    self.dispatch(Event::CopyFinished { ok, at: Instant::now() });
                }
                Effect::Listen(_) | Effect::Unlisten(_) => {}
            }
        }
    }

    /// Drains settings updates and relay replies.
    fn pump(&mut self) {
        while let Ok(s) = self.settings_rx.try_recv() {
            self.dispatch(Event::SettingsChanged(s));
        }
        while let Some(reply) = self.relay.try_recv() {
            self.dispatch(Event::RelayResponded { id: reply.id, result: reply.result });
        }
    }

    fn pointer_events(&self, ctx: &egui::Context, selection: Option<(String, Bounds)>, events: &mut Vec<Event>) {
        let input = ctx.input(|i| {
            i.pointer.interact_pos().map(|pos| PointerInput {
                pos,
                pressed: i.pointer.any_pressed(),
                released: i.pointer.any_released(),
            })
        });
        let Some(input) = input else { return };
        events.extend(pointer_events(
            input,
            self.trigger_rect,
            self.popup_rect,
            &self.listeners,
            selection,
            Instant::now(),
        ));
    }

    fn render_overlay(&mut self, ctx: &egui::Context, events: &mut Vec<Event>) {
        self.trigger_rect = None;
        self.popup_rect = None;
        match self.controller.phase() {
            Phase::ButtonVisible(sel) => {
                let label = sel.direction.trigger_label();
                let area = egui::Area::new(egui::Id::new("seltrans-trigger"))
                    .order(egui::Order::Foreground)
                    .fixed_pos(to_pos(sel.anchor))
                    .show(ctx, |ui| {
                        if ui.button(label).clicked() {
                            events.push(Event::TriggerActivated);
                        }
                    });
                self.trigger_rect = Some(area.response.rect);
            }
            Phase::Popup(popup) => {
                self.popup_rect = Some(show_popup(ctx, popup, events));
            }
            Phase::Idle | Phase::Disabled => {}
        }
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }
        let mut open = true;
        let mut submit = false;
        egui::Window::new("设置")
            .open(&mut open)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.checkbox(&mut self.draft.enabled, "启用划词翻译");
                ui.label("API地址");
                ui.text_edit_singleline(&mut self.draft.api_url);
                ui.label("API密钥");
                ui.add(egui::TextEdit::singleline(&mut self.draft.api_key).password(true));
                egui::ComboBox::from_label("模型")
                    .selected_text(self.draft.model.as_str())
                    .show_ui(ui, |ui| {
                        for m in ModelPreset::ALL {
                            ui.selectable_value(&mut self.draft.model, m, m.as_str());
                        }
                    });
                if let Some(err) = &self.form_error {
                    ui.colored_label(ERROR_RED, err);
                }
                if ui.button("保存").clicked() {
                    submit = true;
                }
            });

        if submit {
            match self.draft.validate() {
                Err(msg) => self.form_error = Some(msg),
                Ok(()) => match self.store.set(self.draft.clone()) {
                    Ok(()) => {
                        self.form_error = None;
                        open = false;
                    }
                    Err(e) => {
                        log::error!("saving settings: {:#}", e);
                        self.form_error = Some(format!("保存失败: {:#}", e));
                    }
                },
            }
        }
        self.settings_open = open;
    }
}

impl eframe::App for TranslatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Wake up periodically so replies are picked up without user input
        ctx.request_repaint_after(Duration::from_millis(120));
        if !self.fonts_set {
            self.fonts_set = true;
            install_cjk_font(ctx);
        }
        self.pump();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("seltrans");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("设置").clicked() {
                        self.draft = self.store.get();
                        self.form_error = None;
                        self.settings_open = true;
                    }
                    if !self.controller.settings().enabled {
                        ui.weak("划词翻译已停用");
                    }
                });
            });
        });

        let page = &self.page;
        let selection = egui::CentralPanel::default().show(ctx, |ui| page_selection(ui, page)).inner;

        let mut events = Vec::new();
        self.pointer_events(ctx, selection, &mut events);
        self.render_overlay(ctx, &mut events);
        events.push(Event::Tick(Instant::now()));
        for e in events {
            self.dispatch(e);
        }
        self.settings_window(ctx);
    }
}

impl Drop for TranslatorApp {
    fn drop(&mut self) {
        for effect in self.controller.teardown() {
            self.listeners.apply(&effect);
        }
        log::info!("UI closed, {} listener(s) left", self.listeners.active_count());
    }
}

/// Read-only page; returns the selected text and its screen box.
fn page_selection(ui: &mut egui::Ui, page: &str) -> Option<(String, Bounds)> {
    egui::ScrollArea::vertical()
        .show(ui, |ui| {
            let mut text: &str = page;
            let output = egui::TextEdit::multiline(&mut text).desired_width(f32::INFINITY).show(ui);
            let range = output.cursor_range?;
            let (a, b) = (range.primary.ccursor.index, range.secondary.ccursor.index);
            let (start, end) = (a.min(b), a.max(b));
            if start == end {
                return None;
            }
            let selected: String = page.chars().skip(start).take(end - start).collect();
            let first = output.galley.pos_from_cursor(&range.primary);
            let last = output.galley.pos_from_cursor(&range.secondary);
            let rect = first.union(last).translate(output.galley_pos.to_vec2());
            Some((selected, to_bounds(rect)))
        })
        .inner
}

fn show_popup(ctx: &egui::Context, popup: &Popup, events: &mut Vec<Event>) -> egui::Rect {
    egui::Area::new(egui::Id::new("seltrans-popup"))
        .order(egui::Order::Foreground)
        .fixed_pos(to_pos(popup.position))
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_width(POPUP_WIDTH);
                ui.horizontal(|ui| {
                    ui.strong(popup.direction.popup_title());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("×").clicked() {
                            events.push(Event::Close);
                        }
                    });
                });
                ui.separator();
                collapsible_text(
                    ui,
                    "seltrans-source",
                    &popup.source,
                    Collapsible::controlled(SOURCE_ROWS, Some(popup.source_expanded)),
                    Event::ToggleSource,
                    events,
                );
                ui.separator();
                match &popup.status {
                    PopupStatus::Loading => {
                        ui.horizontal(|ui| {
                            ui.add(egui::Spinner::new());
                            ui.label("翻译中...");
                        });
                    }
                    PopupStatus::Failed(reason) => {
                        ui.colored_label(ERROR_RED, reason);
                    }
                    PopupStatus::Done(text) => {
                        collapsible_text(
                            ui,
                            "seltrans-translation",
                            text,
                            Collapsible::controlled(TRANSLATION_ROWS, Some(popup.translation_expanded)),
                            Event::ToggleTranslation,
                            events,
                        );
                        let label = if popup.copied { "已复制" } else { "复制" };
                        if ui.button(label).clicked() {
                            events.push(Event::Copy);
                        }
                    }
                }
            });
        })
        .response
        .rect
}

fn collapsible_text(
    ui: &mut egui::Ui,
    id: &str,
    text: &str,
    collapsible: Collapsible,
    toggle: Event,
    events: &mut Vec<Event>,
) {
    let font_id = egui::TextStyle::Body.resolve(ui.style());
    let color = ui.visuals().text_color();
    let wrap = ui.available_width();
    let line_height = ui.fonts(|f| f.row_height(&font_id));
    let natural = ui.fonts(|f| f.layout(text.to_owned(), font_id.clone(), color, wrap)).size().y;
    let clip = collapsible.measure(natural, line_height);

    egui::ScrollArea::vertical()
        .id_source(id)
        .max_height(clip.height)
        .auto_shrink([false, true])
        .show(ui, |ui| {
            ui.label(text);
        });
    if clip.overflowing && ui.small_button(collapsible.toggle_label()).clicked() {
        events.push(toggle);
    }
}

fn install_cjk_font(ctx: &egui::Context) {
    let candidates = [
        r"C:\Windows\Fonts\msyh.ttc",
        r"C:\Windows\Fonts\simsun.ttc",
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/STHeiti Light.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    ];
    let Some((path, bytes)) = candidates.iter().find_map(|p| fs::read(p).ok().map(|b| (*p, b))) else {
        log::warn!("No CJK font found; Chinese text may render as squares");
        return;
    };
    let mut fonts = egui::FontDefinitions::default();
    fonts.font_data.insert("cjk".to_owned(), egui::FontData::from_owned(bytes));
    fonts.families.entry(egui::FontFamily::Proportional).or_default().push("cjk".to_owned());
    fonts.families.entry(egui::FontFamily::Monospace).or_default().push("cjk".to_owned());
    ctx.set_fonts(fonts);
    log::info!("Loaded CJK font: {}", path);
}

pub fn run(store: Arc<SettingsStore>, relay: RelayHandle, page: String) -> anyhow::Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("seltrans")
            .with_inner_size([900.0, 640.0]),
        ..Default::default()
    };
    log::info!("Main UI: starting event loop");
    eframe::run_native(
        "seltrans",
        native_options,
        Box::new(move |_cc| Box::new(TranslatorApp::new(store, relay, page))),
    )
    .map_err(|e| anyhow::anyhow!("UI error: {}", e))?;
    log::info!("Main UI: event loop exited");
    Ok(())
}
