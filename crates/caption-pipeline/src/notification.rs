use crate::{Generation, ImageRef};

/// Events published by a [`crate::CaptionWorker`] while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Started {
        generation: Generation,
        total: usize,
    },
    Progress {
        generation: Generation,
        image: ImageRef,
        failed: bool,
        processed: usize,
        total: usize,
    },
    Completed {
        generation: Generation,
        processed: usize,
        failed: usize,
    },
    Cancelled {
        generation: Generation,
        processed: usize,
    },
    ModelUnavailable {
        generation: Generation,
        reason: String,
    },
}
