//! Request sequencing for one image view.
//!
//! [`ViewSession`] is the state machine between user actions and
//! pipeline results. Every load or filter it issues gets a fresh
//! [`RequestId`] from a monotonically increasing counter; a result is
//! committed only if its id is still the latest one issued. Anything
//! older is discarded without touching the view. There is no queue and
//! no cancellation: superseded work runs to completion and is dropped.
//!
//! The session is generic over the displayable output `O` (a Blob URL
//! in the browser, an [`EncodedImage`](crate::EncodedImage) natively),
//! so it has no I/O of its own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{FailureKind, FilterMode, PipelineError};

/// Which of the two loaded images is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSlot {
    /// The fundus photograph.
    #[default]
    Fundus,
    /// The secondary scan (typically OCT).
    Secondary,
}

/// Identifier of one issued request. Later requests compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A filter computation the caller should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Id to report the result under.
    pub id: RequestId,
    /// Image the filter applies to.
    pub slot: ImageSlot,
    /// Mode to apply. Never [`FilterMode::Original`].
    pub mode: FilterMode,
}

/// What a ready view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown<O> {
    /// The loaded source, unfiltered.
    Source,
    /// A filtered rendering.
    Filtered {
        /// Mode that produced `output`.
        mode: FilterMode,
        /// The rendering.
        output: O,
    },
}

/// Current state of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<O> {
    /// Nothing loaded yet.
    Idle,
    /// A source is being decoded.
    Loading {
        /// Id of the load.
        id: RequestId,
        /// Slot being loaded.
        slot: ImageSlot,
    },
    /// A filter is running over the loaded source.
    Filtering {
        /// Id of the filter request.
        id: RequestId,
        /// Mode being applied.
        mode: FilterMode,
    },
    /// A result is on display.
    Ready(Shown<O>),
    /// The latest request failed.
    Failed {
        /// Failure class.
        kind: FailureKind,
        /// Error message, for logs.
        message: String,
    },
}

/// Outcome of reporting a result to the session.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The result was the latest and now drives the view.
    Applied,
    /// A newer request superseded this one; the result was dropped.
    Discarded,
}

/// Last-writer-wins sequencing of loads and filter runs for one view.
#[derive(Debug, Clone)]
pub struct ViewSession<O> {
    state: ViewState<O>,
    latest: u64,
    slot: ImageSlot,
    mode: FilterMode,
    source: Option<O>,
}

impl<O> Default for ViewSession<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> ViewSession<O> {
    /// An idle session in [`FilterMode::Original`] on the fundus slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ViewState::Idle,
            latest: 0,
            slot: ImageSlot::Fundus,
            mode: FilterMode::Original,
            source: None,
        }
    }

    fn issue(&mut self) -> RequestId {
        self.latest += 1;
        RequestId(self.latest)
    }

    const fn is_latest(&self, id: RequestId) -> bool {
        id.0 == self.latest
    }

    /// Start loading the source for `slot`.
    ///
    /// Supersedes every outstanding load and filter request.
    pub fn begin_load(&mut self, slot: ImageSlot) -> RequestId {
        let id = self.issue();
        self.slot = slot;
        self.source = None;
        self.state = ViewState::Loading { id, slot };
        tracing::debug!(%id, ?slot, "load started");
        id
    }

    /// Report the outcome of the load issued as `id`.
    ///
    /// On success the source becomes displayable, and if the current mode
    /// transforms, a [`FilterRequest`] for it is returned.
    pub fn finish_load(
        &mut self,
        id: RequestId,
        result: Result<O, PipelineError>,
    ) -> (Commit, Option<FilterRequest>) {
        if !self.is_latest(id) {
            tracing::debug!(%id, latest = self.latest, "stale load result discarded");
            return (Commit::Discarded, None);
        }
        match result {
            Ok(source) => {
                self.source = Some(source);
                (Commit::Applied, self.refresh())
            }
            Err(e) => {
                self.fail(&e);
                (Commit::Applied, None)
            }
        }
    }

    /// Switch to `mode`.
    ///
    /// Supersedes any outstanding filter request. Returns the request to
    /// run, or `None` when nothing needs computing: the mode is
    /// [`FilterMode::Original`], or no source has loaded yet (the load
    /// will issue the request when it finishes).
    pub fn set_mode(&mut self, mode: FilterMode) -> Option<FilterRequest> {
        self.mode = mode;
        if self.source.is_none() {
            return None;
        }
        self.refresh()
    }

    /// Re-derive the view from the loaded source and current mode.
    fn refresh(&mut self) -> Option<FilterRequest> {
        let id = self.issue();
        if self.mode.transforms() {
            self.state = ViewState::Filtering {
                id,
                mode: self.mode,
            };
            tracing::debug!(%id, mode = %self.mode, "filter requested");
            Some(FilterRequest {
                id,
                slot: self.slot,
                mode: self.mode,
            })
        } else {
            self.state = ViewState::Ready(Shown::Source);
            None
        }
    }

    /// Report the outcome of filter request `id`.
    pub fn finish_filter(&mut self, id: RequestId, result: Result<O, PipelineError>) -> Commit {
        if !self.is_latest(id) {
            tracing::debug!(%id, latest = self.latest, "stale filter result discarded");
            return Commit::Discarded;
        }
        let ViewState::Filtering { mode, .. } = self.state else {
            return Commit::Discarded;
        };
        match result {
            Ok(output) => self.state = ViewState::Ready(Shown::Filtered { mode, output }),
            Err(e) => self.fail(&e),
        }
        Commit::Applied
    }

    fn fail(&mut self, error: &PipelineError) {
        let kind = error.failure_kind();
        tracing::warn!(?kind, %error, "request failed");
        self.state = ViewState::Failed {
            kind,
            message: error.to_string(),
        };
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ViewState<O> {
        &self.state
    }

    /// Selected mode.
    #[must_use]
    pub const fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Active slot.
    #[must_use]
    pub const fn slot(&self) -> ImageSlot {
        self.slot
    }

    /// Most recently issued request id, if any.
    #[must_use]
    pub const fn latest(&self) -> Option<RequestId> {
        if self.latest == 0 {
            None
        } else {
            Some(RequestId(self.latest))
        }
    }

    /// Whether a load or filter is outstanding.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(
            self.state,
            ViewState::Loading { .. } | ViewState::Filtering { .. }
        )
    }

    /// Failure class of the latest request, or `None` if it has not
    /// failed (including when no result has arrived yet).
    #[must_use]
    pub const fn failure(&self) -> Option<FailureKind> {
        match &self.state {
            ViewState::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The loaded source rendering.
    #[must_use]
    pub const fn source(&self) -> Option<&O> {
        self.source.as_ref()
    }

    /// The filtered rendering on display. `None` in
    /// [`FilterMode::Original`] and while a filter is outstanding.
    #[must_use]
    pub const fn displayed(&self) -> Option<&O> {
        match &self.state {
            ViewState::Ready(Shown::Filtered { output, .. }) => Some(output),
            _ => None,
        }
    }
}
