//! retinaview-io: Browser I/O for the retinaview filter pipeline.
//!
//! Handles web worker communication, Blob URL creation for filter
//! output, and the view controller that sequences requests through
//! `retinaview_pipeline::ViewSession`.

pub mod raster;
pub mod view;
pub mod worker;

pub use raster::{BlobUrl, RasterError};
pub use view::FilterView;
pub use worker::{FilterWorker, WorkerResult};
