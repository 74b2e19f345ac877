//! Client-side file download through a Blob URL and a temporary anchor.

use anyhow::{Result, anyhow};
use gloo_timers::future::TimeoutFuture;
use js_sys::Array;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Blob, BlobPropertyBag, HtmlAnchorElement, Url};

use crate::schedule::browser_delay;

use super::storage::js_message;

const SUBTITLE_MIME: &str = "text/plain;charset=utf-8";

/// Offer `content` as `filename`; the object URL is revoked after `revoke_after_ms`.
pub(crate) fn save_file(filename: &str, content: &str, revoke_after_ms: u64) -> Result<()> {
    let parts = Array::of1(&JsValue::from_str(content));
    let options = BlobPropertyBag::new();
    options.set_type(SUBTITLE_MIME);
    let blob = Blob::new_with_str_sequence_and_options(&parts, &options).map_err(|err| anyhow!(js_message(&err)))?;
    let url = Url::create_object_url_with_blob(&blob).map_err(|err| anyhow!(js_message(&err)))?;

    let document = gloo::utils::document();
    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(|err| anyhow!(js_message(&err)))?
        .dyn_into()
        .map_err(|_| anyhow!("anchor element unavailable"))?;
    anchor.set_href(&url);
    anchor.set_download(filename);
    let body = gloo::utils::body();
    body.append_child(&anchor).map_err(|err| anyhow!(js_message(&err)))?;
    anchor.click();
    anchor.remove();

    wasm_bindgen_futures::spawn_local(async move {
        TimeoutFuture::new(browser_delay(revoke_after_ms)).await;
        if let Err(err) = Url::revoke_object_url(&url) {
            gloo::console::warn!("object url revoke failed", err);
        }
    });
    Ok(())
}
