//! Web worker communication for off-main-thread filtering.
//!
//! [`FilterWorker`] wraps a `web_sys::Worker` running the
//! `retinaview-worker` WASM module. Each [`run`](FilterWorker::run)
//! posts source bytes, mode, and config tagged with the caller's
//! [`RequestId`] and resolves when the response carrying that id comes
//! back. Requests may overlap; the worker answers them in order and
//! every caller gets its own response. Deciding which response still
//! matters is up to the caller (see `ViewSession`).
//!
//! The worker is created from embedded JS + WASM blobs, so no extra
//! static files need to be served.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use retinaview_pipeline::{
    Dimensions, EncodedImage, FilterConfig, FilterDiagnostics, FilterMode, PipelineError,
    RequestId,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::raster::RasterError;

/// A successful worker response.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    /// The encoded output.
    pub encoded: EncodedImage,
    /// Name of the decoder that read the source.
    pub decoder: String,
    /// Stage timings, if the worker sent parseable diagnostics.
    pub diagnostics: Option<FilterDiagnostics>,
}

/// Resolve/reject pair of one outstanding request.
struct Pending {
    resolve: js_sys::Function,
    reject: js_sys::Function,
}

type PendingMap = Rc<RefCell<HashMap<u64, Pending>>>;

/// A filter worker that runs `process_with_diagnostics` in a dedicated
/// web worker.
///
/// Create one at startup and reuse it for every request.
pub struct FilterWorker {
    worker: web_sys::Worker,
    pending: PendingMap,
    _onmessage: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _onerror: Closure<dyn FnMut(web_sys::ErrorEvent)>,
}

impl FilterWorker {
    /// Create a worker from embedded JS glue and WASM binary.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::JsError`] if the blobs or the worker
    /// cannot be created (e.g. outside a browser).
    pub fn new(worker_js: &str, worker_wasm: &[u8]) -> Result<Self, RasterError> {
        let worker = create_worker(worker_js, worker_wasm)?;
        let pending: PendingMap = Rc::new(RefCell::new(HashMap::new()));

        let on_message_pending = Rc::clone(&pending);
        let onmessage = Closure::<dyn FnMut(web_sys::MessageEvent)>::new(
            move |event: web_sys::MessageEvent| {
                let data = event.data();
                let Some(id) = get(&data, "generation").as_f64().and_then(f64_to_u64) else {
                    return;
                };
                let entry = on_message_pending.borrow_mut().remove(&id);
                if let Some(pending) = entry {
                    let _ = pending.resolve.call1(&JsValue::NULL, &data);
                }
            },
        );

        let on_error_pending = Rc::clone(&pending);
        let onerror =
            Closure::<dyn FnMut(web_sys::ErrorEvent)>::new(move |event: web_sys::ErrorEvent| {
                // A worker-level error leaves no way to tell which request
                // failed, so every outstanding one is rejected.
                let message = JsValue::from_str(&event.message());
                let drained: Vec<Pending> = on_error_pending
                    .borrow_mut()
                    .drain()
                    .map(|(_, pending)| pending)
                    .collect();
                for pending in drained {
                    let _ = pending.reject.call1(&JsValue::NULL, &message);
                }
            });

        worker.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        worker.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        Ok(Self {
            worker,
            pending,
            _onmessage: onmessage,
            _onerror: onerror,
        })
    }

    /// Run the filter pipeline in the worker.
    ///
    /// # Errors
    ///
    /// Returns the worker's [`PipelineError`] if decoding or filtering
    /// failed, and [`PipelineError::Compute`] if the message could not
    /// be posted, the worker crashed, or the response was malformed.
    #[allow(clippy::future_not_send)] // WASM is single-threaded
    pub async fn run(
        &self,
        id: RequestId,
        image_bytes: &[u8],
        source_name: Option<&str>,
        mode: FilterMode,
        config: &FilterConfig,
    ) -> Result<WorkerResult, PipelineError> {
        let config_json = serde_json::to_string(config).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to serialize config: {e}"))
        })?;

        let message = js_sys::Object::new();
        let set = |key: &str, val: &JsValue| {
            js_sys::Reflect::set(&message, &JsValue::from_str(key), val)
                .map(|_| ())
                .map_err(|_| PipelineError::Compute(format!("failed to set {key}")))
        };
        set("imageBytes", &js_sys::Uint8Array::from(image_bytes))?;
        if let Some(name) = source_name {
            set("sourceName", &JsValue::from_str(name))?;
        }
        set("mode", &JsValue::from_str(mode.as_str()))?;
        set("configJson", &JsValue::from_str(&config_json))?;
        set("generation", &JsValue::from_f64(id_to_f64(id)))?;

        let (promise, resolve, reject) = new_promise()?;
        self.pending
            .borrow_mut()
            .insert(id.0, Pending { resolve, reject });

        if self.worker.post_message(&message).is_err() {
            self.pending.borrow_mut().remove(&id.0);
            return Err(PipelineError::Compute("failed to postMessage".into()));
        }

        match wasm_bindgen_futures::JsFuture::from(promise).await {
            Ok(data) => parse_response(&data),
            Err(e) => {
                let msg = e
                    .as_string()
                    .unwrap_or_else(|| "unknown worker error".into());
                Err(PipelineError::Compute(format!("worker error: {msg}")))
            }
        }
    }
}

impl Drop for FilterWorker {
    fn drop(&mut self) {
        self.worker.set_onmessage(None);
        self.worker.set_onerror(None);
        self.worker.terminate();
    }
}

fn get(data: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(data, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

#[allow(clippy::cast_precision_loss)]
fn id_to_f64(id: RequestId) -> f64 {
    id.0 as f64
}

/// Largest integer a JS number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A whole, non-negative JS number as `u64`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64(value: f64) -> Option<u64> {
    ((0.0..=MAX_SAFE_INTEGER).contains(&value) && value.fract() == 0.0).then_some(value as u64)
}

/// Turn a worker response object into a result.
fn parse_response(data: &JsValue) -> Result<WorkerResult, PipelineError> {
    if get(data, "ok").as_bool() != Some(true) {
        let error_json = get(data, "errorJson")
            .as_string()
            .ok_or_else(|| PipelineError::Compute("worker response missing errorJson".into()))?;
        let error = serde_json::from_str::<PipelineError>(&error_json).unwrap_or_else(|e| {
            PipelineError::Compute(format!("failed to deserialize worker error: {e}"))
        });
        return Err(error);
    }

    let bytes: js_sys::Uint8Array = get(data, "pngBytes")
        .dyn_into()
        .map_err(|_| PipelineError::Compute("worker response missing pngBytes".into()))?;
    let dimension = |key: &str| {
        get(data, key)
            .as_f64()
            .and_then(f64_to_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| PipelineError::Compute(format!("worker response missing {key}")))
    };
    let dimensions = Dimensions {
        width: dimension("width")?,
        height: dimension("height")?,
    };
    let decoder = get(data, "decoder").as_string().unwrap_or_default();
    let diagnostics = get(data, "diagnosticsJson")
        .as_string()
        .and_then(|json| serde_json::from_str(&json).ok());

    Ok(WorkerResult {
        encoded: EncodedImage {
            bytes: bytes.to_vec(),
            dimensions,
        },
        decoder,
        diagnostics,
    })
}

/// Create a web worker from embedded JS glue and WASM binary.
///
/// 1. Creates a Blob URL for the WASM binary
/// 2. Wraps the JS glue in a self-initializing script that loads the
///    WASM from the Blob URL
/// 3. Creates a Worker from a Blob URL of the wrapper script
fn create_worker(worker_js: &str, worker_wasm: &[u8]) -> Result<web_sys::Worker, RasterError> {
    let wasm_array = js_sys::Uint8Array::from(worker_wasm);
    let wasm_blob_parts = js_sys::Array::new();
    wasm_blob_parts.push(&wasm_array.buffer());
    let wasm_blob_opts = web_sys::BlobPropertyBag::new();
    wasm_blob_opts.set_type("application/wasm");
    let wasm_blob = web_sys::Blob::new_with_buffer_source_sequence_and_options(
        &wasm_blob_parts,
        &wasm_blob_opts,
    )?;
    let wasm_url = web_sys::Url::create_object_url_with_blob(&wasm_blob)?;

    let wrapper_js = format!(
        r#"{worker_js}

wasm_bindgen("{wasm_url}")
    .catch(function(e) {{ console.error("Worker WASM init failed:", e); }});
"#
    );

    let js_blob_parts = js_sys::Array::new();
    js_blob_parts.push(&JsValue::from_str(&wrapper_js));
    let js_blob_opts = web_sys::BlobPropertyBag::new();
    js_blob_opts.set_type("application/javascript");
    let js_blob = web_sys::Blob::new_with_str_sequence_and_options(&js_blob_parts, &js_blob_opts)?;
    let js_url = web_sys::Url::create_object_url_with_blob(&js_blob)?;

    let worker = web_sys::Worker::new(&js_url)?;

    // The WASM URL stays alive: the worker's async init may still be
    // fetching it.
    web_sys::Url::revoke_object_url(&js_url).ok();

    Ok(worker)
}

/// Create a JS Promise along with its resolve and reject functions.
fn new_promise() -> Result<(js_sys::Promise, js_sys::Function, js_sys::Function), PipelineError> {
    let resolve = Rc::new(RefCell::new(None::<js_sys::Function>));
    let reject = Rc::new(RefCell::new(None::<js_sys::Function>));
    let resolve_clone = Rc::clone(&resolve);
    let reject_clone = Rc::clone(&reject);

    let promise = js_sys::Promise::new(&mut move |res, rej| {
        *resolve_clone.borrow_mut() = Some(res);
        *reject_clone.borrow_mut() = Some(rej);
    });

    let resolve_fn = resolve.borrow_mut().take();
    let reject_fn = reject.borrow_mut().take();
    match (resolve_fn, reject_fn) {
        (Some(resolve), Some(reject)) => Ok((promise, resolve, reject)),
        _ => Err(PipelineError::Compute("promise executor never ran".into())),
    }
}
