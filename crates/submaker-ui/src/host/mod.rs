//! Browser host: runs the state machines against DOM APIs and reports
//! renderable changes to a JavaScript callback.
//!
//! # Design
//! - One [`SubmakerClient`] per page; its state lives behind `Rc<RefCell<_>>`.
//! - Machine inputs borrow the state only while the machine runs; effects are
//!   executed after the borrow ends so renderer callbacks may re-enter.
//! - Async callbacks hold `Weak` references and go quiet once the client is dropped.

mod download;
mod net;
mod storage;

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use gloo::console;
use gloo::events::EventListener;
use gloo_timers::future::TimeoutFuture;
use js_sys::{Date, Function, JSON};
use serde_json::{Map, Value};
use submaker_core::{
    BridgeEffect, BridgeTimer, BroadcastPort, EpisodeEffect, ExtensionBridge,
    InventoryLoadOptions, LinkState, MenuEffect, MenuTimer, PageUrlBuilder, SseFrame,
    SubtitleMenu, TimerCommand, Watcher, WatcherDeps, WatcherEffect, WatcherTimer, new_tab_id,
};
use submaker_events::{BridgeEnvelope, ChannelNames, StreamDescriptor};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{BroadcastChannel, MessageEvent, StorageEvent};

use crate::bootstrap::PageBootstrap;
use crate::schedule::{Scheduled, TimerRegistry, browser_delay};
use crate::views::{UiEvent, bridge_event, episode_event, link_name, menu_event};

use self::net::{StreamHandle, StreamSink};
use self::storage::{ChannelPort, LocalStore, js_message};

struct PageState {
    watcher: Watcher,
    menu: SubtitleMenu,
    bridge: ExtensionBridge,
    watcher_timers: TimerRegistry<WatcherTimer>,
    menu_timers: TimerRegistry<MenuTimer>,
    bridge_timers: TimerRegistry<BridgeTimer>,
    streams: HashMap<u64, StreamHandle>,
    listeners: Vec<EventListener>,
    channel: Option<BroadcastChannel>,
    renderer: Function,
    last_link: Option<LinkState>,
}

type Page = Rc<RefCell<PageState>>;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn now_ms() -> u64 {
    Date::now() as u64
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Install the panic hook once the module loads.
#[wasm_bindgen(start)]
fn install_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Page client exported to JavaScript.
#[wasm_bindgen]
pub struct SubmakerClient {
    page: Page,
}

#[wasm_bindgen]
impl SubmakerClient {
    /// Build the client from the page bootstrap JSON. `renderer` receives one
    /// JSON event string per call.
    ///
    /// # Errors
    /// Rejects malformed bootstrap documents and pages without an addon configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(bootstrap: &str, renderer: Function) -> Result<SubmakerClient, JsValue> {
        let bootstrap = PageBootstrap::from_json(bootstrap).map_err(to_js)?;
        let ctx = bootstrap.context();
        let names = ChannelNames::for_config(ctx.require().map_err(to_js)?);
        let channel = BroadcastChannel::new(&names.channel).ok();
        if channel.is_none() {
            console::warn!("BroadcastChannel unavailable; this tab keeps its own stream link");
        }

        let page_url = if bootstrap.page_url.is_empty() {
            gloo::utils::window().location().href().unwrap_or_default()
        } else {
            bootstrap.page_url.clone()
        };
        let deps = WatcherDeps {
            store: Box::new(LocalStore::open()),
            port: channel
                .clone()
                .map(|channel| Box::new(ChannelPort::new(channel)) as Box<dyn BroadcastPort>),
            url_builder: Box::new(PageUrlBuilder::new(page_url)),
        };
        let watcher = Watcher::new(&ctx, &bootstrap.settings, &bootstrap.stream, new_tab_id(), deps)
            .map_err(to_js)?;
        let menu = SubtitleMenu::new(ctx, &bootstrap.settings.translation, bootstrap.stream.clone());
        let bridge = ExtensionBridge::new(&bootstrap.settings.bridge);

        let page = Rc::new(RefCell::new(PageState {
            watcher,
            menu,
            bridge,
            watcher_timers: TimerRegistry::default(),
            menu_timers: TimerRegistry::default(),
            bridge_timers: TimerRegistry::default(),
            streams: HashMap::new(),
            listeners: Vec::new(),
            channel: channel.clone(),
            renderer,
            last_link: None,
        }));
        install_listeners(&page, channel.as_ref());
        Ok(Self { page })
    }

    /// Elect and connect.
    pub fn start(&self) {
        drive_watcher(&self.page, Watcher::start);
    }

    /// Toast "Update" pressed.
    #[wasm_bindgen(js_name = toastUpdate)]
    pub fn toast_update(&self) {
        drive_watcher(&self.page, |watcher, _| watcher.on_toast_update());
    }

    /// Toast "Dismiss" pressed.
    #[wasm_bindgen(js_name = toastDismiss)]
    pub fn toast_dismiss(&self) {
        drive_watcher(&self.page, |watcher, _| watcher.on_toast_dismiss());
    }

    /// Answer a `lookupTitle` event.
    #[wasm_bindgen(js_name = titleResolved)]
    pub fn title_resolved(&self, request_id: u32, title: &str) {
        drive_watcher(&self.page, |watcher, _| {
            watcher.on_title_resolved(u64::from(request_id), title)
        });
    }

    /// Load the subtitle list of the linked stream.
    #[wasm_bindgen(js_name = loadSubtitles)]
    pub fn load_subtitles(&self, force: bool) {
        let loaded = self
            .page
            .borrow_mut()
            .menu
            .load_subtitle_inventory(InventoryLoadOptions { force });
        match loaded {
            Ok(effects) => run_menu(&self.page, effects),
            Err(err) => render(
                &self.page,
                UiEvent::InventoryFailed {
                    message: err.to_string(),
                },
            ),
        }
    }

    /// Rebind the menu to another stream (`{videoId, filename, videoHash}`).
    ///
    /// # Errors
    /// Rejects payloads that are not stream descriptors.
    #[wasm_bindgen(js_name = switchStream)]
    pub fn switch_stream(&self, descriptor: &str) -> Result<(), JsValue> {
        let descriptor: StreamDescriptor = serde_json::from_str(descriptor).map_err(to_js)?;
        drive_menu(&self.page, |menu, _| menu.reset_for_stream(descriptor));
        Ok(())
    }

    /// Translate button of entry `id` pressed.
    pub fn translate(&self, id: &str) {
        drive_menu(&self.page, |menu, now| menu.handle_translation_button_click(id, now));
    }

    /// Download the finished translation of entry `id`.
    pub fn download(&self, id: &str) {
        drive_menu(&self.page, |menu, now| menu.handle_translation_download(id, now));
    }

    /// Probe for the browser extension.
    #[wasm_bindgen(js_name = pingExtension)]
    pub fn ping_extension(&self) {
        drive_bridge(&self.page, ExtensionBridge::ping);
    }

    /// Send `operation` to the extension with JSON object `data`; returns the message id.
    ///
    /// # Errors
    /// Rejects `data` that is not a JSON object.
    #[wasm_bindgen(js_name = extensionRequest)]
    pub fn extension_request(&self, operation: &str, data: &str) -> Result<String, JsValue> {
        let data: Map<String, Value> = serde_json::from_str(data).map_err(to_js)?;
        let (message_id, effects) = self
            .page
            .borrow_mut()
            .bridge
            .request(operation, data, now_ms());
        run_bridge(&self.page, effects);
        Ok(message_id)
    }

    /// Release the lease, close connections and silence every timer.
    pub fn dispose(&self) {
        teardown(&self.page);
    }
}

fn install_listeners(page: &Page, channel: Option<&BroadcastChannel>) {
    let window = gloo::utils::window();
    let mut listeners = Vec::new();

    let weak = Rc::downgrade(page);
    listeners.push(EventListener::new(&window, "storage", move |event| {
        let Some(event) = event.dyn_ref::<StorageEvent>() else {
            return;
        };
        let (Some(key), Some(page)) = (event.key(), weak.upgrade()) else {
            return;
        };
        let new_value = event.new_value();
        drive_watcher(&page, |watcher, now| {
            watcher.on_storage_event(&key, new_value.as_deref(), now)
        });
    }));

    if let Some(channel) = channel {
        let weak = Rc::downgrade(page);
        listeners.push(EventListener::new(channel, "message", move |event| {
            let Some(raw) = event
                .dyn_ref::<MessageEvent>()
                .and_then(|event| event.data().as_string())
            else {
                return;
            };
            if let Some(page) = weak.upgrade() {
                drive_watcher(&page, |watcher, now| watcher.on_channel_message(&raw, now));
            }
        }));
    }

    let weak = Rc::downgrade(page);
    listeners.push(EventListener::new(&window, "message", move |event| {
        let Some(data) = event.dyn_ref::<MessageEvent>().map(MessageEvent::data) else {
            return;
        };
        let Some(raw) = JSON::stringify(&data).ok().and_then(|text| text.as_string()) else {
            return;
        };
        let Ok(envelope) = BridgeEnvelope::decode(&raw) else {
            return;
        };
        if let Some(page) = weak.upgrade() {
            drive_bridge(&page, |bridge, _| bridge.on_message(&envelope));
        }
    }));

    for name in ["beforeunload", "pagehide"] {
        let weak = Rc::downgrade(page);
        listeners.push(EventListener::new(&window, name, move |_| {
            if let Some(page) = weak.upgrade() {
                drive_watcher(&page, |watcher, _| watcher.on_unload());
            }
        }));
    }

    page.borrow_mut().listeners = listeners;
}

fn teardown(page: &Page) {
    drive_watcher(page, |watcher, _| watcher.dispose());
    drive_menu(page, |menu, _| menu.dispose());
    drive_bridge(page, |bridge, _| bridge.dispose());
    let mut state = page.borrow_mut();
    state.listeners.clear();
    for (_, stream) in state.streams.drain() {
        stream.close();
    }
    state.watcher_timers.clear();
    state.menu_timers.clear();
    state.bridge_timers.clear();
    if let Some(channel) = state.channel.take() {
        channel.close();
    }
}

fn render(page: &Page, event: UiEvent) {
    let renderer = page.borrow().renderer.clone();
    if let Err(err) = renderer.call1(&JsValue::NULL, &JsValue::from_str(&event.to_json())) {
        console::error!("renderer callback failed", err);
    }
}

fn schedule<K>(
    page: &Page,
    command: TimerCommand<K>,
    registry: fn(&mut PageState) -> &mut TimerRegistry<K>,
    fire: fn(&Page, K),
) where
    K: Clone + Eq + Hash + 'static,
{
    let scheduled = registry(&mut page.borrow_mut()).apply(command);
    let Scheduled::Sleep {
        key,
        token,
        delay_ms,
    } = scheduled
    else {
        return;
    };
    let weak = Rc::downgrade(page);
    spawn_local(async move {
        TimeoutFuture::new(browser_delay(delay_ms)).await;
        let Some(page) = weak.upgrade() else {
            return;
        };
        let current = registry(&mut page.borrow_mut()).claim(&key, token);
        if current {
            fire(&page, key);
        }
    });
}

fn watcher_timers(state: &mut PageState) -> &mut TimerRegistry<WatcherTimer> {
    &mut state.watcher_timers
}

fn menu_timers(state: &mut PageState) -> &mut TimerRegistry<MenuTimer> {
    &mut state.menu_timers
}

fn bridge_timers(state: &mut PageState) -> &mut TimerRegistry<BridgeTimer> {
    &mut state.bridge_timers
}

fn drive_watcher(page: &Page, input: impl FnOnce(&mut Watcher, u64) -> Vec<WatcherEffect>) {
    let (effects, link) = {
        let mut state = page.borrow_mut();
        let effects = input(&mut state.watcher, now_ms());
        let link = state.watcher.state();
        let changed = state.last_link.replace(link) != Some(link);
        (effects, changed.then_some(link))
    };
    for effect in effects {
        apply_watcher(page, effect);
    }
    if let Some(link) = link {
        render(page, UiEvent::Link { state: link_name(link) });
    }
}

fn apply_watcher(page: &Page, effect: WatcherEffect) {
    match effect {
        WatcherEffect::Timer(command) => {
            schedule(page, command, watcher_timers, |page, key| {
                drive_watcher(page, |watcher, now| watcher.on_timer(key, now));
            });
        }
        WatcherEffect::OpenSse { url, generation } => {
            let sink = WatcherSink {
                page: Rc::downgrade(page),
                generation,
            };
            match net::open_stream(url, sink) {
                Some(handle) => {
                    page.borrow_mut().streams.insert(generation, handle);
                }
                None => drive_watcher(page, |watcher, now| watcher.on_sse_error(generation, now)),
            }
        }
        WatcherEffect::CloseSse { generation } => {
            let handle = page.borrow_mut().streams.remove(&generation);
            if let Some(handle) = handle {
                handle.close();
            }
        }
        WatcherEffect::FetchActivity { url, ticket } => {
            let weak = Rc::downgrade(page);
            spawn_local(async move {
                let result = net::fetch_no_store(&url).await;
                if let Some(page) = weak.upgrade() {
                    drive_watcher(&page, |watcher, now| {
                        watcher.on_activity_result(ticket, result, now)
                    });
                }
            });
        }
        WatcherEffect::Episode(EpisodeEffect::Navigate { url }) => {
            if let Err(err) = gloo::utils::window().location().set_href(&url) {
                console::error!("navigation failed", err);
            }
        }
        WatcherEffect::Episode(effect) => {
            if let Some(event) = episode_event(&effect) {
                render(page, event);
            }
        }
    }
}

struct WatcherSink {
    page: Weak<RefCell<PageState>>,
    generation: u64,
}

impl StreamSink for WatcherSink {
    fn opened(&self) {
        if let Some(page) = self.page.upgrade() {
            drive_watcher(&page, |watcher, _| watcher.on_sse_open(self.generation));
        }
    }

    fn frame(&self, frame: &SseFrame) {
        if let Some(page) = self.page.upgrade() {
            drive_watcher(&page, |watcher, now| {
                watcher.on_sse_frame(self.generation, frame, now)
            });
        }
    }

    fn failed(&self, reason: &str) {
        console::warn!("stream activity link failed", reason.to_string());
        if let Some(page) = self.page.upgrade() {
            page.borrow_mut().streams.remove(&self.generation);
            drive_watcher(&page, |watcher, now| watcher.on_sse_error(self.generation, now));
        }
    }
}

fn drive_menu(page: &Page, input: impl FnOnce(&mut SubtitleMenu, u64) -> Vec<MenuEffect>) {
    let effects = {
        let mut state = page.borrow_mut();
        input(&mut state.menu, now_ms())
    };
    run_menu(page, effects);
}

fn run_menu(page: &Page, effects: Vec<MenuEffect>) {
    for effect in effects {
        apply_menu(page, effect);
    }
}

fn apply_menu(page: &Page, effect: MenuEffect) {
    match effect {
        MenuEffect::Timer(command) => {
            schedule(page, command, menu_timers, |page, key| {
                drive_menu(page, |menu, now| menu.on_timer(&key, now));
            });
        }
        MenuEffect::FetchInventory { ticket, url } => {
            let weak = Rc::downgrade(page);
            spawn_local(async move {
                let result = net::fetch_no_store(&url).await;
                if let Some(page) = weak.upgrade() {
                    drive_menu(&page, |menu, now| menu.on_inventory_result(ticket, result, now));
                }
            });
        }
        MenuEffect::FetchTranslation { id, url, ticket, .. } => {
            let weak = Rc::downgrade(page);
            spawn_local(async move {
                let result = net::fetch_no_store(&url).await;
                if let Some(page) = weak.upgrade() {
                    drive_menu(&page, |menu, now| {
                        menu.on_translation_reply(&id, ticket, result, now)
                    });
                }
            });
        }
        MenuEffect::SaveFile {
            filename,
            content,
            revoke_after_ms,
        } => {
            if let Err(err) = download::save_file(&filename, &content, revoke_after_ms) {
                console::error!("download failed", err.to_string());
            }
        }
        other => {
            let event = menu_event(&other, page.borrow().menu.translations());
            if let Some(event) = event {
                render(page, event);
            }
        }
    }
}

fn drive_bridge(page: &Page, input: impl FnOnce(&mut ExtensionBridge, u64) -> Vec<BridgeEffect>) {
    let effects = {
        let mut state = page.borrow_mut();
        input(&mut state.bridge, now_ms())
    };
    run_bridge(page, effects);
}

fn run_bridge(page: &Page, effects: Vec<BridgeEffect>) {
    for effect in effects {
        match effect {
            BridgeEffect::Timer(command) => {
                schedule(page, command, bridge_timers, |page, key| {
                    drive_bridge(page, |bridge, _| bridge.on_timer(&key));
                });
            }
            BridgeEffect::Post(envelope) => post_to_window(&envelope),
            other => {
                if let Some(event) = bridge_event(&other) {
                    render(page, event);
                }
            }
        }
    }
}

fn post_to_window(envelope: &BridgeEnvelope) {
    let message = match envelope.encode() {
        Ok(text) => JSON::parse(&text),
        Err(err) => {
            console::error!("extension message encode failed", err.to_string());
            return;
        }
    };
    let posted = message.and_then(|value| gloo::utils::window().post_message(&value, "*"));
    if let Err(err) = posted {
        console::error!("extension message post failed", js_message(&err));
    }
}
