//! `localStorage` as the shared store and `BroadcastChannel` as the port.

use submaker_core::{BroadcastPort, SharedStore, StoreError, TransportError};
use wasm_bindgen::JsValue;
use web_sys::{BroadcastChannel, Storage};

/// Raw string access to `window.localStorage`.
///
/// Values are stored verbatim (no JSON re-encoding) so every tab and the
/// server-rendered page read the same text.
pub(crate) struct LocalStore {
    storage: Option<Storage>,
}

impl LocalStore {
    pub(crate) fn open() -> Self {
        let storage = web_sys::window().and_then(|window| window.local_storage().ok().flatten());
        Self { storage }
    }
}

impl SharedStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let storage = self.storage.as_ref().ok_or(StoreError::Unavailable)?;
        storage.set_item(key, value).map_err(|err| StoreError::Write {
            key: key.to_string(),
            message: js_message(&err),
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let storage = self.storage.as_ref().ok_or(StoreError::Unavailable)?;
        storage.remove_item(key).map_err(|err| StoreError::Write {
            key: key.to_string(),
            message: js_message(&err),
        })
    }
}

/// Posting half of the per-configuration broadcast channel.
pub(crate) struct ChannelPort {
    channel: BroadcastChannel,
}

impl ChannelPort {
    pub(crate) const fn new(channel: BroadcastChannel) -> Self {
        Self { channel }
    }
}

impl BroadcastPort for ChannelPort {
    fn post(&self, message: &str) -> Result<(), TransportError> {
        self.channel
            .post_message(&JsValue::from_str(message))
            .map_err(|err| TransportError::Post(js_message(&err)))
    }
}

pub(crate) fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}
