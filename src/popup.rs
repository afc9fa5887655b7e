//! Selection → trigger → popup state machine.
//!
//! The controller owns every piece of UI state as one [`Phase`]; the host
//! feeds it [`Event`]s and carries out the [`Effect`]s it returns (listener
//! registration, relay calls, clipboard writes). Nothing here touches a
//! window or the network, so the whole flow runs in plain unit tests.

use crate::config::Settings;
use crate::lang::Direction;
use crate::relay::{RequestId, TranslationRequest, TranslationResult};
use crate::widgets::{Bounds, DragTracker, Point};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Gap between the bottom of the selection and the trigger button.
pub const ANCHOR_GAP: f32 = 5.0;
/// Outside clicks closer together than this are handled once.
pub const OUTSIDE_CLICK_SETTLE: Duration = Duration::from_millis(100);
/// How long the "copied" mark stays on.
pub const COPIED_RESET: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Listener {
    Selection,
    OutsideClick,
    /// Pointer move/release while the popup is being dragged.
    DragMotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Trigger,
    Popup,
    Page,
}

/// Regions under the pointer, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPath(Vec<Region>);

impl EventPath {
    pub fn new(regions: impl IntoIterator<Item = Region>) -> Self {
        Self(regions.into_iter().collect())
    }

    pub fn page() -> Self {
        Self(vec![Region::Page])
    }

    pub fn through(region: Region) -> Self {
        Self(vec![region, Region::Page])
    }

    pub fn hits_overlay(&self) -> bool {
        self.0.iter().any(|r| matches!(r, Region::Trigger | Region::Popup))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub text: String,
    pub anchor: Point,
    pub direction: Direction,
}

impl Selection {
    /// `None` for a blank selection. The anchor sits just below the
    /// selection's bounding box.
    pub fn capture(text: &str, bounds: Bounds) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            anchor: Point::new(bounds.left, bounds.bottom() + ANCHOR_GAP),
            direction: Direction::detect(text),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupStatus {
    Loading,
    Done(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub request_id: RequestId,
    pub source: String,
    pub direction: Direction,
    pub status: PopupStatus,
    pub copied: bool,
    copied_at: Option<Instant>,
    pub position: Point,
    pub source_expanded: bool,
    pub translation_expanded: bool,
    pub drag: DragTracker,
}

impl Popup {
    fn open(request_id: RequestId, selection: Selection) -> Self {
        Self {
            request_id,
            source: selection.text,
            direction: selection.direction,
            status: PopupStatus::Loading,
            copied: false,
            copied_at: None,
            position: selection.anchor,
            source_expanded: false,
            translation_expanded: false,
            drag: DragTracker::default(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, PopupStatus::Loading)
    }

    pub fn translated_text(&self) -> &str {
        match &self.status {
            PopupStatus::Done(text) => text,
            _ => "",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            PopupStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Trigger and popup are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Feature off: nothing rendered, no listeners.
    Disabled,
    Idle,
    ButtonVisible(Selection),
    Popup(Popup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disabled,
    Idle,
    ButtonVisible,
    Translating,
    ResultVisible(Outcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Pointer released with `selection` (text and its bounding box) current.
    SelectionChanged { selection: Option<(String, Bounds)>, path: EventPath },
    PointerDown { path: EventPath, at: Instant },
    TriggerActivated,
    RelayResponded { id: RequestId, result: TranslationResult },
    Close,
    Copy,
    CopyFinished { ok: bool, at: Instant },
    Tick(Instant),
    ToggleSource,
    ToggleTranslation,
    DragPressed { pointer: Point, bounds: Bounds },
    DragMoved(Point),
    DragReleased,
    SettingsChanged(Settings),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Listen(Listener),
    Unlisten(Listener),
    Translate { id: RequestId, request: TranslationRequest },
    CopyToClipboard(String),
}

pub struct Controller {
    phase: Phase,
    settings: Settings,
    next_id: RequestId,
    attached: BTreeSet<Listener>,
    outside_busy_until: Option<Instant>,
    mounted: bool,
}

fn listen(attached: &mut BTreeSet<Listener>, l: Listener, fx: &mut Vec<Effect>) {
    if attached.insert(l) {
        fx.push(Effect::Listen(l));
    }
}

fn unlisten(attached: &mut BTreeSet<Listener>, l: Listener, fx: &mut Vec<Effect>) {
    if attached.remove(&l) {
        fx.push(Effect::Unlisten(l));
    }
}

impl Controller {
    /// Mounts the controller; listeners come back as effects.
    pub fn new(settings: Settings) -> (Self, Vec<Effect>) {
        let mut c = Self {
            phase: Phase::Disabled,
            settings,
            next_id: 0,
            attached: BTreeSet::new(),
            outside_busy_until: None,
            mounted: true,
        };
        let mut fx = Vec::new();
        if c.settings.enabled {
            c.enable(&mut fx);
        }
        (c, fx)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_listening(&self, l: Listener) -> bool {
        self.attached.contains(&l)
    }

    pub fn status(&self) -> Status {
        match &self.phase {
            Phase::Disabled => Status::Disabled,
            Phase::Idle => Status::Idle,
            Phase::ButtonVisible(_) => Status::ButtonVisible,
            Phase::Popup(p) => match p.status {
                PopupStatus::Loading => Status::Translating,
                PopupStatus::Done(_) => Status::ResultVisible(Outcome::Done),
                PopupStatus::Failed(_) => Status::ResultVisible(Outcome::Error),
            },
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            Event::SelectionChanged { selection, path } => self.on_selection(selection, path),
            Event::PointerDown { path, at } => self.on_pointer_down(path, at),
            Event::TriggerActivated => self.on_trigger(&mut fx),
            Event::RelayResponded { id, result } => self.on_reply(id, result),
            Event::Close => self.on_close(&mut fx),
            Event::Copy => {
                if let Phase::Popup(p) = &self.phase {
                    if let PopupStatus::Done(text) = &p.status {
                        fx.push(Effect::CopyToClipboard(text.clone()));
                    }
                }
            }
            Event::CopyFinished { ok, at } => {
                if let Phase::Popup(p) = &mut self.phase {
                    if ok {
                        p.copied = true;
                        p.copied_at = Some(at);
                    } else {
                        log::warn!("clipboard write failed");
                    }
                }
            }
            Event::Tick(now) => {
                if let Phase::Popup(p) = &mut self.phase {
                    if let Some(at) = p.copied_at {
                        if now.saturating_duration_since(at) >= COPIED_RESET {
                            p.copied = false;
                            p.copied_at = None;
                        }
                    }
                }
            }
            Event::ToggleSource => {
                if let Phase::Popup(p) = &mut self.phase {
                    p.source_expanded = !p.source_expanded;
                }
            }
            Event::ToggleTranslation => {
                if let Phase::Popup(p) = &mut self.phase {
                    p.translation_expanded = !p.translation_expanded;
                }
            }
            Event::DragPressed { pointer, bounds } => {
                if let Phase::Popup(p) = &mut self.phase {
                    if p.drag.press(pointer, bounds) {
                        listen(&mut self.attached, Listener::DragMotion, &mut fx);
                    }
                }
            }
            Event::DragMoved(pointer) => {
                if let Phase::Popup(p) = &mut self.phase {
                    if self.attached.contains(&Listener::DragMotion) {
                        if let Some(pos) = p.drag.drag_to(pointer) {
                            p.position = pos;
                        }
                    }
                }
            }
            Event::DragReleased => {
                if let Phase::Popup(p) = &mut self.phase {
                    p.drag.release();
                }
                unlisten(&mut self.attached, Listener::DragMotion, &mut fx);
            }
            Event::SettingsChanged(settings) => self.on_settings(settings, &mut fx),
        }
        fx
    }

    /// Unmount: every listener goes away and nothing comes back on re-enable.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        self.disable(&mut fx);
        self.mounted = false;
        fx
    }

    fn enable(&mut self, fx: &mut Vec<Effect>) {
        self.phase = Phase::Idle;
        self.outside_busy_until = None;
        listen(&mut self.attached, Listener::Selection, fx);
        listen(&mut self.attached, Listener::OutsideClick, fx);
    }

    fn disable(&mut self, fx: &mut Vec<Effect>) {
        self.phase = Phase::Disabled;
        for l in std::mem::take(&mut self.attached) {
            fx.push(Effect::Unlisten(l));
        }
    }

    fn on_selection(&mut self, selection: Option<(String, Bounds)>, path: EventPath) {
        if !self.attached.contains(&Listener::Selection) || path.hits_overlay() {
            return;
        }
        if !matches!(self.phase, Phase::Idle | Phase::ButtonVisible(_)) {
            return;
        }
        match selection.and_then(|(text, bounds)| Selection::capture(&text, bounds)) {
            Some(sel) => {
                log::debug!("selection of {} chars, {:?}", sel.text.chars().count(), sel.direction);
                self.phase = Phase::ButtonVisible(sel);
            }
            None => self.phase = Phase::Idle,
        }
    }

    fn on_pointer_down(&mut self, path: EventPath, at: Instant) {
        if !self.attached.contains(&Listener::OutsideClick) || path.hits_overlay() {
            return;
        }
        if self.outside_busy_until.is_some_and(|until| at < until) {
            log::trace!("outside click ignored, previous pass still settling");
            return;
        }
        self.outside_busy_until = Some(at + OUTSIDE_CLICK_SETTLE);
        if let Phase::ButtonVisible(_) = self.phase {
            self.phase = Phase::Idle;
        }
    }

    fn on_trigger(&mut self, fx: &mut Vec<Effect>) {
        let Phase::ButtonVisible(sel) = &self.phase else { return };
        let sel = sel.clone();
        self.next_id += 1;
        let id = self.next_id;
        let request = TranslationRequest { text: sel.text.clone(), api_config: self.settings.clone() };
        log::info!("translating request {} ({})", id, sel.direction.target_language());
        self.phase = Phase::Popup(Popup::open(id, sel));
        fx.push(Effect::Translate { id, request });
    }

    fn on_reply(&mut self, id: RequestId, result: TranslationResult) {
        match &mut self.phase {
            Phase::Popup(p) if p.request_id == id => {
                p.status = match result.into_outcome() {
                    Ok(text) => PopupStatus::Done(text),
                    Err(reason) => PopupStatus::Failed(reason),
                };
                p.copied = false;
                p.copied_at = None;
            }
            _ => log::debug!("discarding reply for closed request {}", id),
        }
    }

    fn on_close(&mut self, fx: &mut Vec<Effect>) {
        if let Phase::Popup(p) = &self.phase {
            log::debug!("closing popup for request {}", p.request_id);
            self.phase = Phase::Idle;
            unlisten(&mut self.attached, Listener::DragMotion, fx);
        }
    }

    fn on_settings(&mut self, settings: Settings, fx: &mut Vec<Effect>) {
        self.settings = settings;
        if !self.settings.enabled {
            if self.phase != Phase::Disabled {
                log::info!("translator disabled");
                self.disable(fx);
            }
        } else if self.phase == Phase::Disabled && self.mounted {
            log::info!("translator enabled");
            self.enable(fx);
        }
    }
}

/// Host-side view of which listeners are installed.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    active: BTreeSet<Listener>,
    attaches: usize,
    detaches: usize,
}

impl ListenerRegistry {
    /// Applies `Listen` / `Unlisten`; other effects are left to the caller.
    pub fn apply(&mut self, effect: &Effect) -> bool {
        match effect {
            Effect::Listen(l) => {
                if self.active.insert(*l) {
                    self.attaches += 1;
                }
                true
            }
            Effect::Unlisten(l) => {
                if self.active.remove(l) {
                    self.detaches += 1;
                }
                true
            }
            _ => false,
        }
    }

    pub fn is_listening(&self, l: Listener) -> bool {
        self.active.contains(&l)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches
    }

    pub fn detach_count(&self) -> usize {
        self.detaches
    }
}
