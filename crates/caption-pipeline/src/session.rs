use crate::{
    export, Caption, CaptionCache, CaptionWorker, ExportReport, Generation, ImageRef,
    ProgressTracker, RunOutcome, RunProgress, SessionError, WorkerError, WorkerEvent,
};
use ai::{ComputeDevice, ImageCaptionModel, ModelStatus};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

pub const CAPTION_NOT_FOUND: &str = "Caption not found";

/// The image under the cursor together with whatever caption is cached for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub image: ImageRef,
    pub index: usize,
    pub total: usize,
    pub caption: Option<Caption>,
}

impl DisplayItem {
    pub fn caption_text(&self) -> String {
        match &self.caption {
            Some(caption) => caption.text().into_owned(),
            None => CAPTION_NOT_FOUND.to_string(),
        }
    }
}

pub fn model_status_text(status: &ModelStatus) -> String {
    match status {
        ModelStatus::Loading => "Model loading...".to_string(),
        ModelStatus::Ready(_) => "Model ready!".to_string(),
        ModelStatus::Failed(reason) => format!("Model failed to load: {}", reason),
    }
}

struct RunHandle {
    generation: Generation,
    cancel_token: CancellationToken,
    handle: JoinHandle<Result<RunOutcome, WorkerError>>,
}

/// Headless display controller: holds the selection, the cursor over it and the
/// captioning run that feeds the cache. Must be used inside a tokio runtime.
pub struct CaptionSession {
    model: ImageCaptionModel,
    cache: CaptionCache,
    progress: ProgressTracker,
    notifier: Option<mpsc::Sender<WorkerEvent>>,
    prompt: Option<String>,
    images: Vec<ImageRef>,
    cursor: usize,
    current_run: Option<RunHandle>,
}

impl CaptionSession {
    pub fn new(model: ImageCaptionModel) -> Self {
        Self {
            model,
            cache: CaptionCache::new(),
            progress: ProgressTracker::new(),
            notifier: None,
            prompt: None,
            images: vec![],
            cursor: 0,
            current_run: None,
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

    /// Replace the selection and start captioning it. Any run still going for the
    /// previous selection is cancelled and can no longer write to the cache.
    pub fn select<I, P>(&mut self, paths: I) -> Result<Generation, SessionError>
    where
        I: IntoIterator<Item = P>,
        P: Into<ImageRef>,
    {
        let images: Vec<ImageRef> = paths.into_iter().map(Into::into).collect();
        if images.is_empty() {
            return Err(SessionError::EmptySelection);
        }

        self.cancel();

        let generation = self.cache.clear();
        self.progress.reset(generation, images.len());
        self.images = images;
        self.cursor = 0;

        let worker = CaptionWorker::new(
            self.model.clone(),
            self.cache.clone(),
            self.progress.clone(),
        )
        .with_notifier(self.notifier.clone())
        .with_prompt(self.prompt.clone());

        let cancel_token = CancellationToken::new();
        let handle = {
            let images = self.images.clone();
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move { worker.run(generation, &images, cancel_token).await })
        };

        tracing::info!(
            "selected {} images, captioning run {} started",
            self.images.len(),
            generation
        );

        self.current_run = Some(RunHandle {
            generation,
            cancel_token,
            handle,
        });

        Ok(generation)
    }

    /// Stop the current run, if any. It finishes the image it is working on and discards it.
    pub fn cancel(&mut self) {
        if let Some(run) = self.current_run.take() {
            tracing::debug!("cancel captioning run {}", run.generation);
            run.cancel_token.cancel();
        }
    }

    /// Wait for the current run to end.
    pub async fn join(&mut self) -> Option<Result<RunOutcome, SessionError>> {
        let run = self.current_run.take()?;
        let result = match run.handle.await {
            Ok(result) => result.map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };
        Some(result)
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn cache(&self) -> &CaptionCache {
        &self.cache
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<DisplayItem> {
        let image = self.images.get(self.cursor)?;
        Some(DisplayItem {
            image: image.clone(),
            index: self.cursor,
            total: self.images.len(),
            caption: self.cache.get(image),
        })
    }

    pub fn next_image(&mut self) -> Option<DisplayItem> {
        if self.cursor + 1 < self.images.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn prev_image(&mut self) -> Option<DisplayItem> {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    pub fn progress(&self) -> RunProgress {
        self.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn status_text(&self) -> String {
        self.progress.snapshot().status_text()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }

    pub fn subscribe_model_status(&self) -> watch::Receiver<ModelStatus> {
        self.model.subscribe()
    }

    pub fn model_status_text(&self) -> String {
        model_status_text(&self.model.status())
    }

    /// Move the model to the device called `name`. The old device stays in use on error.
    pub async fn set_device(&self, name: &str) -> Result<ComputeDevice, SessionError> {
        let device = ComputeDevice::parse(name)?;
        Ok(self.model.set_device(device).await?)
    }

    pub async fn export(&self) -> Result<ExportReport, SessionError> {
        let state = self.progress.snapshot().state;
        Ok(export(&self.cache, &self.images, state).await?)
    }
}

impl Drop for CaptionSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
