//! View controller: drives a [`ViewSession`] with a [`FilterWorker`].
//!
//! [`FilterView`] owns the source bytes of both image slots and turns
//! user actions (load an image, pick a slot, pick a mode) into worker
//! requests. Results go through the session, so a response that lost
//! the race to a newer request is dropped and its Blob URL revoked.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use retinaview_pipeline::{
    Commit, FailureKind, FilterConfig, FilterMode, FilterRequest, ImageSlot, PipelineError,
    RequestId, ViewSession, ViewState,
};

use crate::raster::{BlobUrl, encoded_to_blob_url};
use crate::worker::FilterWorker;

/// Source bytes of one slot.
#[derive(Clone)]
struct Source {
    bytes: Rc<[u8]>,
    name: Option<Rc<str>>,
}

/// Browser-side controller for one image view.
pub struct FilterView {
    worker: FilterWorker,
    config: FilterConfig,
    session: RefCell<ViewSession<BlobUrl>>,
    sources: RefCell<HashMap<ImageSlot, Source>>,
}

impl FilterView {
    /// A view with nothing loaded, in [`FilterMode::Original`].
    #[must_use]
    pub fn new(worker: FilterWorker, config: FilterConfig) -> Self {
        Self {
            worker,
            config,
            session: RefCell::new(ViewSession::new()),
            sources: RefCell::new(HashMap::new()),
        }
    }

    /// Load new source bytes into `slot` and make it active.
    ///
    /// `source_name` is the file name or URL, used for decoder selection.
    #[allow(clippy::future_not_send)]
    pub async fn load(&self, slot: ImageSlot, bytes: Vec<u8>, source_name: Option<String>) {
        self.sources.borrow_mut().insert(
            slot,
            Source {
                bytes: bytes.into(),
                name: source_name.map(Into::into),
            },
        );
        self.activate(slot).await;
    }

    /// Make `slot` active, reloading its stored source.
    ///
    /// Returns `false` if nothing was ever loaded into `slot`.
    #[allow(clippy::future_not_send)]
    pub async fn select_slot(&self, slot: ImageSlot) -> bool {
        if !self.sources.borrow().contains_key(&slot) {
            return false;
        }
        self.activate(slot).await;
        true
    }

    /// Switch the filter mode, running the filter if one is needed.
    #[allow(clippy::future_not_send)]
    pub async fn set_mode(&self, mode: FilterMode) {
        let request = self.session.borrow_mut().set_mode(mode);
        if let Some(request) = request {
            self.run_filter(request).await;
        }
    }

    #[allow(clippy::future_not_send)]
    async fn activate(&self, slot: ImageSlot) {
        let id = self.session.borrow_mut().begin_load(slot);
        let source = self.sources.borrow().get(&slot).cloned();
        let result = match source {
            Some(source) => self.render(id, &source, FilterMode::Original).await,
            None => Err(PipelineError::EmptyInput),
        };

        let (commit, request) = self.session.borrow_mut().finish_load(id, result);
        self.after_commit(id, commit);
        if let Some(request) = request {
            self.run_filter(request).await;
        }
    }

    #[allow(clippy::future_not_send)]
    async fn run_filter(&self, request: FilterRequest) {
        let source = self.sources.borrow().get(&request.slot).cloned();
        let result = match source {
            Some(source) => self.render(request.id, &source, request.mode).await,
            None => Err(PipelineError::Compute(format!(
                "no source loaded for {:?}",
                request.slot
            ))),
        };
        let commit = self.session.borrow_mut().finish_filter(request.id, result);
        self.after_commit(request.id, commit);
    }

    /// Run `mode` over `source` in the worker and wrap the PNG.
    #[allow(clippy::future_not_send)]
    async fn render(
        &self,
        id: RequestId,
        source: &Source,
        mode: FilterMode,
    ) -> Result<BlobUrl, PipelineError> {
        let name = source.name.as_deref();
        let output = self
            .worker
            .run(id, &source.bytes, name, mode, &self.config)
            .await?;
        let decoded_by = format!("retinaview: {id} decoded by {}", output.decoder);
        web_sys::console::debug_1(&decoded_by.into());
        if let Some(diagnostics) = &output.diagnostics {
            web_sys::console::debug_1(&diagnostics.report().into());
        }
        encoded_to_blob_url(&output.encoded).map_err(|e| PipelineError::Compute(e.to_string()))
    }

    fn after_commit(&self, id: RequestId, commit: Commit) {
        match commit {
            Commit::Discarded => {
                web_sys::console::debug_1(&format!("retinaview: stale result {id} dropped").into());
            }
            Commit::Applied => {
                if let ViewState::Failed { kind, message } = self.session.borrow().state() {
                    web_sys::console::warn_1(
                        &format!("retinaview: {kind:?} failure for {id}: {message}").into(),
                    );
                }
            }
        }
    }

    /// Whether a load or filter is outstanding.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.session.borrow().is_processing()
    }

    /// Failure class of the latest request. `None` covers both success
    /// and "no result yet".
    #[must_use]
    pub fn failure(&self) -> Option<FailureKind> {
        self.session.borrow().failure()
    }

    /// Selected mode.
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.session.borrow().mode()
    }

    /// Active slot.
    #[must_use]
    pub fn slot(&self) -> ImageSlot {
        self.session.borrow().slot()
    }

    /// URL of the filtered rendering, `None` in [`FilterMode::Original`].
    #[must_use]
    pub fn filtered_url(&self) -> Option<String> {
        self.session
            .borrow()
            .displayed()
            .map(|url| url.as_str().to_owned())
    }

    /// URL of the loaded source rendering.
    #[must_use]
    pub fn source_url(&self) -> Option<String> {
        self.session
            .borrow()
            .source()
            .map(|url| url.as_str().to_owned())
    }

    /// URL for the `<img>`: the filtered rendering if there is one,
    /// otherwise the source.
    #[must_use]
    pub fn image_url(&self) -> Option<String> {
        self.filtered_url().or_else(|| self.source_url())
    }
}
