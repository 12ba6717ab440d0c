//! Blob URL creation for encoded filter output.
//!
//! Wraps PNG bytes in a `Blob` and hands out an object URL usable as an
//! `<img src>`. [`BlobUrl`] revokes its URL when dropped, so superseded
//! and discarded results release their blobs without explicit cleanup.

use std::fmt;

use retinaview_pipeline::EncodedImage;
use wasm_bindgen::JsValue;
use web_sys::BlobPropertyBag;

/// Errors that can occur during Blob URL conversion.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// There were no bytes to wrap.
    #[error("encoded image is empty")]
    Empty,

    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for RasterError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// An object URL owning a Blob, revoked on drop.
#[derive(Debug, PartialEq, Eq)]
pub struct BlobUrl(String);

impl BlobUrl {
    /// The URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Drop for BlobUrl {
    fn drop(&mut self) {
        revoke_blob_url(&self.0);
    }
}

/// Wrap `bytes` of the given MIME type in a Blob URL.
///
/// # Errors
///
/// Returns [`RasterError::Empty`] if `bytes` is empty.
/// Returns [`RasterError::JsError`] if Blob or URL creation fails.
pub fn bytes_to_blob_url(bytes: &[u8], mime_type: &str) -> Result<BlobUrl, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::Empty);
    }

    let uint8_array = js_sys::Uint8Array::from(bytes);
    let parts = js_sys::Array::new();
    parts.push(&uint8_array);

    let opts = BlobPropertyBag::new();
    opts.set_type(mime_type);
    let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &opts)?;

    let url = web_sys::Url::create_object_url_with_blob(&blob)?;
    Ok(BlobUrl(url))
}

/// Wrap an encoded filter output in a Blob URL.
///
/// # Errors
///
/// See [`bytes_to_blob_url`].
pub fn encoded_to_blob_url(image: &EncodedImage) -> Result<BlobUrl, RasterError> {
    bytes_to_blob_url(&image.bytes, EncodedImage::MIME_TYPE)
}

/// Revoke a Blob URL.
///
/// Best-effort: failures are silently ignored since the URL may have
/// already been revoked.
pub fn revoke_blob_url(url: &str) {
    let _ = web_sys::Url::revoke_object_url(url);
}
