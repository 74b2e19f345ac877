//! Network I/O for the host: one-shot `no-store` GETs and the streamed
//! stream-activity connection.
//!
//! # Design
//! - Read the event stream through fetch streaming so the same parser serves
//!   native and browser hosts.
//! - Report open, frames and failure through callbacks tagged by the caller;
//!   reconnect policy lives in the watcher, not here.
//! - Expose an abort handle so a superseded connection can be dropped.

use gloo_net::http::Request;
use js_sys::{Reflect, Uint8Array};
use submaker_core::{FetchFailure, FetchResult, HttpReply, SseFrame, SseParser};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AbortController, AbortSignal, ReadableStream, ReadableStreamDefaultReader, RequestCache,
    RequestInit, RequestMode, Response,
};

use super::storage::js_message;

/// `GET` with `cache: no-store`, collapsed into a [`FetchResult`].
pub(crate) async fn fetch_no_store(url: &str) -> FetchResult {
    let response = Request::get(url)
        .cache(RequestCache::NoStore)
        .send()
        .await
        .map_err(|err| FetchFailure::new(err.to_string()))?;
    let status = response.status();
    let content_disposition = response.headers().get("content-disposition");
    let body = if status == 204 {
        String::new()
    } else {
        response
            .text()
            .await
            .map_err(|err| FetchFailure::new(err.to_string()))?
    };
    let reply = HttpReply::new(status, body);
    Ok(match content_disposition {
        Some(value) => reply.with_content_disposition(value),
        None => reply,
    })
}

/// Abort handle of one stream-activity connection.
pub(crate) struct StreamHandle {
    controller: AbortController,
}

impl StreamHandle {
    pub(crate) fn close(&self) {
        self.controller.abort();
    }
}

/// Callbacks of one stream-activity connection.
pub(crate) trait StreamSink: 'static {
    fn opened(&self);
    fn frame(&self, frame: &SseFrame);
    fn failed(&self, reason: &str);
}

/// Open `url` as an event stream and drive `sink` until it ends or is aborted.
pub(crate) fn open_stream(url: String, sink: impl StreamSink) -> Option<StreamHandle> {
    let controller = AbortController::new().ok()?;
    let signal = controller.signal();
    wasm_bindgen_futures::spawn_local(async move {
        run_stream(&url, &signal, &sink).await;
    });
    Some(StreamHandle { controller })
}

async fn run_stream(url: &str, signal: &AbortSignal, sink: &impl StreamSink) {
    let mut reader = match connect(url, signal).await {
        Ok(reader) => reader,
        Err(err) => {
            if !signal.aborted() {
                sink.failed(&err.to_string());
            }
            return;
        }
    };
    sink.opened();
    let mut parser = SseParser::default();
    loop {
        if signal.aborted() {
            return;
        }
        match read_chunk(&mut reader).await {
            Ok(Some(bytes)) => {
                // Characters cut at a read boundary are completed by the next read.
                for frame in parser.push_bytes(&bytes.to_vec()) {
                    sink.frame(&frame);
                }
            }
            Ok(None) => {
                if let Some(frame) = parser.finish() {
                    sink.frame(&frame);
                }
                if !signal.aborted() {
                    sink.failed("stream ended");
                }
                return;
            }
            Err(err) => {
                if !signal.aborted() {
                    sink.failed(&err);
                }
                return;
            }
        }
    }
}

async fn connect(
    url: &str,
    signal: &AbortSignal,
) -> Result<ReadableStreamDefaultReader, ConnectError> {
    let window = web_sys::window().ok_or(ConnectError::Window)?;
    let init = RequestInit::new();
    init.set_method("GET");
    init.set_mode(RequestMode::Cors);
    init.set_cache(RequestCache::NoStore);
    init.set_signal(Some(signal));

    let request =
        web_sys::Request::new_with_str_and_init(url, &init).map_err(|_| ConnectError::Request)?;
    if let Err(err) = request.headers().set("Accept", "text/event-stream") {
        gloo::console::warn!("accept header rejected", err);
    }
    let resp = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|_| ConnectError::Fetch)?;
    let response: Response = resp.dyn_into().map_err(|_| ConnectError::Fetch)?;
    if !response.ok() {
        return Err(ConnectError::Status(response.status()));
    }
    let stream: ReadableStream = response.body().ok_or(ConnectError::Stream)?;
    stream
        .get_reader()
        .dyn_into::<ReadableStreamDefaultReader>()
        .map_err(|_| ConnectError::Reader)
}

async fn read_chunk(
    reader: &mut ReadableStreamDefaultReader,
) -> Result<Option<Uint8Array>, String> {
    let chunk = JsFuture::from(reader.read())
        .await
        .map_err(|err| format!("read failed: {}", js_message(&err)))?;
    let done = Reflect::get(&chunk, &JsValue::from_str("done"))
        .map_err(|err| format!("chunk done lookup failed: {}", js_message(&err)))?
        .as_bool()
        .unwrap_or(false);
    if done {
        return Ok(None);
    }
    let value = Reflect::get(&chunk, &JsValue::from_str("value"))
        .map_err(|err| format!("chunk value lookup failed: {}", js_message(&err)))?;
    Ok(Some(Uint8Array::new(&value)))
}

#[derive(Debug)]
enum ConnectError {
    Window,
    Request,
    Fetch,
    Stream,
    Reader,
    Status(u16),
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Window => write!(f, "window unavailable"),
            Self::Request => write!(f, "request build failed"),
            Self::Fetch => write!(f, "fetch failed"),
            Self::Stream => write!(f, "stream response missing body"),
            Self::Reader => write!(f, "stream reader unavailable"),
            Self::Status(code) => write!(f, "http {code}"),
        }
    }
}
