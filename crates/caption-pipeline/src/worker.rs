use crate::{
    Caption, CaptionCache, Generation, ImageRef, ProcessingState, ProgressTracker, WorkerError,
    WorkerEvent,
};
use ai::{ImageCaptionInput, ImageCaptionModel};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { processed: usize, failed: usize },
    Cancelled { processed: usize },
}

/// Captions a list of images one after another.
///
/// A failure on one image is stored as [`Caption::Failed`] and the run moves on.
/// The cancellation token is checked before every image; results for a generation
/// that is no longer current are discarded.
#[derive(Clone)]
pub struct CaptionWorker {
    model: ImageCaptionModel,
    cache: CaptionCache,
    progress: ProgressTracker,
    notifier: Option<mpsc::Sender<WorkerEvent>>,
    prompt: Option<String>,
}

impl CaptionWorker {
    pub fn new(model: ImageCaptionModel, cache: CaptionCache, progress: ProgressTracker) -> Self {
        Self {
            model,
            cache,
            progress,
            notifier: None,
            prompt: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<mpsc::Sender<WorkerEvent>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    async fn notify(&self, event: WorkerEvent) {
        if let Some(tx) = &self.notifier {
            if let Err(e) = tx.send(event).await {
                tracing::error!("Failed to send worker event: {}", e);
            }
        }
    }

    async fn cancelled(&self, generation: Generation, processed: usize) -> RunOutcome {
        tracing::info!("captioning run {} cancelled after {} images", generation, processed);
        self.notify(WorkerEvent::Cancelled {
            generation,
            processed,
        })
        .await;
        RunOutcome::Cancelled { processed }
    }

    async fn caption(&self, image: &ImageRef) -> Caption {
        let mut input = ImageCaptionInput::new(image.path());
        if let Some(prompt) = &self.prompt {
            input = input.with_prompt(prompt.clone());
        }

        let caption = Caption::from_result(self.model.process_single(input).await);
        if let Caption::Failed(reason) = &caption {
            tracing::warn!("failed to caption {}: {}", image, reason);
        }
        caption
    }

    #[tracing::instrument(
        name = "CaptionWorker::run",
        skip_all,
        fields(generation = generation, total = images.len())
    )]
    pub async fn run(
        &self,
        generation: Generation,
        images: &[ImageRef],
        cancel_token: CancellationToken,
    ) -> Result<RunOutcome, WorkerError> {
        let total = images.len();

        self.progress.set_state(generation, ProcessingState::Loading);
        let ready = tokio::select! {
            res = self.model.wait_until_ready() => res,
            _ = cancel_token.cancelled() => {
                return Ok(self.cancelled(generation, 0).await);
            }
        };

        if let Err(e) = ready {
            tracing::error!("captioning run {} aborted: {}", generation, e);
            self.progress.set_state(generation, ProcessingState::Idle);
            self.notify(WorkerEvent::ModelUnavailable {
                generation,
                reason: e.to_string(),
            })
            .await;
            return Err(e.into());
        }

        self.progress.set_state(generation, ProcessingState::Running);
        self.notify(WorkerEvent::Started { generation, total }).await;

        let mut processed = 0;
        let mut failed = 0;

        for image in images {
            if cancel_token.is_cancelled() {
                return Ok(self.cancelled(generation, processed).await);
            }

            let caption = self.caption(image).await;
            let is_failed = caption.is_failed();

            if !self.cache.put_for(generation, image.clone(), caption) {
                // a newer selection already cleared the cache
                return Ok(self.cancelled(generation, processed).await);
            }

            processed += 1;
            if is_failed {
                failed += 1;
            }
            self.progress.record(generation, is_failed);
            self.notify(WorkerEvent::Progress {
                generation,
                image: image.clone(),
                failed: is_failed,
                processed,
                total,
            })
            .await;
        }

        self.progress.set_state(generation, ProcessingState::Completed);
        self.notify(WorkerEvent::Completed {
            generation,
            processed,
            failed,
        })
        .await;
        tracing::info!(
            "captioning run {} completed: {} images, {} failed",
            generation,
            processed,
            failed
        );

        Ok(RunOutcome::Completed { processed, failed })
    }
}
