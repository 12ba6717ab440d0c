//! Web worker entry point for retinaview filter processing.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives source bytes, a filter mode, and a
//! `FilterConfig` via `postMessage`, runs
//! `retinaview_pipeline::process_with_diagnostics`, and posts the
//! encoded PNG back.
//!
//! The PNG is sent as a raw `Uint8Array` rather than JSON so large
//! results cross the boundary without per-byte encoding overhead.

use retinaview_pipeline::{FilterConfig, FilterMode, PipelineError, ProcessResult, WebClock};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Message protocol: the main thread sends a JS object with:
/// - `imageBytes`: `Uint8Array` containing the raw source file bytes
/// - `sourceName`: `String` file name or URL, or `undefined`
/// - `mode`: `String` filter mode identifier (`original`, `vessel`, ...)
/// - `configJson`: `String` containing JSON-serialized `FilterConfig`
/// - `generation`: `f64` request id (passed through to response)
///
/// On success the worker responds with:
/// - `generation`: `f64` matching the request
/// - `ok`: `true`
/// - `pngBytes`: `Uint8Array` encoded output
/// - `width`, `height`: `f64` output dimensions
/// - `decoder`: `String` decoder strategy name
/// - `diagnosticsJson`: `String` JSON-serialized `FilterDiagnostics`
///
/// On error the worker responds with:
/// - `generation`: `f64`
/// - `ok`: `false`
/// - `errorJson`: `String` JSON-serialized `PipelineError`
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

/// A decoded request message.
struct Request {
    image_bytes: Vec<u8>,
    source_name: Option<String>,
    mode: FilterMode,
    config: FilterConfig,
}

fn field(data: &JsValue, name: &str) -> JsValue {
    js_sys::Reflect::get(data, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

/// Extract a [`Request`] from a message object.
fn parse_request(data: &JsValue) -> Result<Request, PipelineError> {
    let image_bytes: js_sys::Uint8Array = field(data, "imageBytes")
        .dyn_into()
        .map_err(|_| PipelineError::InvalidConfig("imageBytes is not a Uint8Array".into()))?;
    let source_name = field(data, "sourceName").as_string();

    let mode = field(data, "mode")
        .as_string()
        .ok_or_else(|| PipelineError::InvalidConfig("mode is not a string".into()))?
        .parse::<FilterMode>()
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

    let config_json = field(data, "configJson")
        .as_string()
        .ok_or_else(|| PipelineError::InvalidConfig("configJson is not a string".into()))?;
    let config: FilterConfig = serde_json::from_str(&config_json)
        .map_err(|e| PipelineError::InvalidConfig(format!("failed to parse config: {e}")))?;

    Ok(Request {
        image_bytes: image_bytes.to_vec(),
        source_name,
        mode,
        config,
    })
}

/// Handle an incoming message from the main thread.
fn handle_message(event: &web_sys::MessageEvent) {
    let data = event.data();
    let generation = field(&data, "generation").as_f64().unwrap_or(-1.0);

    let outcome = parse_request(&data).and_then(|request| {
        // Synchronous: blocks this worker thread only.
        retinaview_pipeline::process_with_diagnostics(
            &request.image_bytes,
            request.source_name.as_deref(),
            request.mode,
            &request.config,
            &WebClock,
        )
    });

    match outcome {
        Ok((result, diagnostics)) => {
            let diagnostics_json = serde_json::to_string(&diagnostics).unwrap_or_default();
            post_success_response(generation, &result, &diagnostics_json);
        }
        Err(e) => {
            let error_json = serde_json::to_string(&e)
                .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
            post_error_json(generation, &error_json);
        }
    }
}

/// Post a successful result back to the main thread.
fn post_success_response(generation: f64, result: &ProcessResult, diagnostics_json: &str) {
    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };

    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(true));
    set(
        "pngBytes",
        &js_sys::Uint8Array::from(result.encoded.bytes.as_slice()),
    );
    set(
        "width",
        &JsValue::from_f64(f64::from(result.encoded.dimensions.width)),
    );
    set(
        "height",
        &JsValue::from_f64(f64::from(result.encoded.dimensions.height)),
    );
    set("decoder", &JsValue::from_str(&result.decoder.to_string()));
    set("diagnosticsJson", &JsValue::from_str(diagnostics_json));

    post(&response);
}

/// Post a pre-serialized error JSON back to the main thread.
fn post_error_json(generation: f64, error_json: &str) {
    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("generation"),
        &JsValue::from_f64(generation),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("ok"),
        &JsValue::from_bool(false),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("errorJson"),
        &JsValue::from_str(error_json),
    );
    post(&response);
}

fn post(response: &js_sys::Object) {
    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(response);
    }
}
