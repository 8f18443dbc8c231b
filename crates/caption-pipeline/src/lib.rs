mod cache;
mod caption;
mod error;
mod export;
mod gateway;
mod image_ref;
mod notification;
mod progress;
mod session;
mod worker;

#[cfg(test)]
mod test_util;

pub use cache::{CacheEntry, CaptionCache, Generation};
pub use caption::Caption;
pub use error::{ExportError, SessionError, WorkerError};
pub use export::{export, ExportFailure, ExportReport};
pub use gateway::{moondream_caption_model, ModelArtifact, MoondreamConfig, MOONDREAM_MODEL_ID};
pub use image_ref::ImageRef;
pub use notification::WorkerEvent;
pub use progress::{ProcessingState, ProgressTracker, RunProgress};
pub use session::{model_status_text, CaptionSession, DisplayItem, CAPTION_NOT_FOUND};
pub use worker::{CaptionWorker, RunOutcome};
