mod image_caption;

use crate::{loader, ComputeDevice, GatewayError, GatewayResult, HandlerPayload};
pub use image_caption::*;
use std::fmt::{self, Debug};
use std::future::Future;
use tokio::sync::{mpsc, oneshot, watch};

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> impl Future<Output = anyhow::Result<Vec<anyhow::Result<Self::Output>>>> + Send;

    /// Largest batch `process` accepts. Longer requests are split before they reach the model.
    fn batch_size_limit(&self) -> usize;

    fn device(&self) -> ComputeDevice;

    /// Rebind the model to `device`. On error the model must stay usable on its old device.
    fn set_device(
        &mut self,
        device: ComputeDevice,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready(ComputeDevice),
    Failed(String),
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelStatus::Ready(_))
    }
}

enum ModelPayload<TItem, TOutput> {
    Process(HandlerPayload<TItem, TOutput>),
    SetDevice(ComputeDevice, oneshot::Sender<GatewayResult<ComputeDevice>>),
}

/// Handle to a model living on its own thread.
///
/// Every request goes through one queue and is served while holding the model lock,
/// so at most one inference or device switch runs at a time for all clones of a handle.
pub struct AIModel<TItem, TOutput> {
    model_id: String, // for better logging
    tx: mpsc::Sender<ModelPayload<TItem, TOutput>>,
    status: watch::Receiver<ModelStatus>,
}

impl<TItem, TOutput> Clone for AIModel<TItem, TOutput> {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            tx: self.tx.clone(),
            status: self.status.clone(),
        }
    }
}

impl<TItem, TOutput> Debug for AIModel<TItem, TOutput> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AIModel")
            .field("model_id", &self.model_id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

async fn switch_device<T: Model>(
    model: &mut T,
    device: ComputeDevice,
) -> GatewayResult<ComputeDevice> {
    if model.device() == device {
        return Ok(device);
    }

    model
        .set_device(device)
        .await
        .map_err(|e| match e.downcast::<GatewayError>() {
            Ok(e) => e,
            Err(e) => GatewayError::UnsupportedDevice(format!("{}: {:#}", device, e)),
        })?;

    Ok(model.device())
}

async fn process_in_batches<T: Model>(
    model: &mut T,
    items: Vec<T::Item>,
) -> anyhow::Result<Vec<anyhow::Result<T::Output>>> {
    let batch_size = model.batch_size_limit().max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter();

    loop {
        let batch: Vec<_> = items.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        results.extend(model.process(batch).await?);
    }

    Ok(results)
}

fn into_gateway_error(e: anyhow::Error) -> GatewayError {
    match e.downcast::<GatewayError>() {
        Ok(e) => e,
        Err(e) => GatewayError::Inference(format!("{:#}", e)),
    }
}

impl<TItem, TOutput> AIModel<TItem, TOutput>
where
    TItem: Send + Sync + Clone + Debug + 'static,
    TOutput: Send + Sync + Debug + 'static,
{
    /// Spawn the model thread and start loading on `device` right away.
    /// Returns immediately; use [`AIModel::wait_until_ready`] to await the load.
    pub fn new<T, TFut, TFn>(
        model_id: impl Into<String>,
        create_model: TFn,
        device: ComputeDevice,
    ) -> anyhow::Result<Self>
    where
        T: Model<Item = TItem, Output = TOutput> + Send + 'static,
        TFut: Future<Output = anyhow::Result<T>> + 'static,
        TFn: Fn(ComputeDevice) -> TFut + Send + 'static,
    {
        let model_id = model_id.into();
        let loader = loader::ModelLoader::new(create_model);
        let (tx, mut rx) = mpsc::channel::<ModelPayload<TItem, TOutput>>(512);
        let (status_tx, status_rx) = watch::channel(ModelStatus::Loading);

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let thread_model_id = model_id.clone();
        std::thread::Builder::new()
            .name(format!("model-{}", model_id))
            .spawn(move || {
                let local = tokio::task::LocalSet::new();

                local.spawn_local(async move {
                    let mut load_error = match loader.load(device).await {
                        Ok(_) => {
                            tracing::info!("model {} ready on {}", thread_model_id, device);
                            status_tx.send_replace(ModelStatus::Ready(device));
                            None
                        }
                        Err(e) => {
                            let reason = format!("{:#}", e);
                            tracing::error!(
                                "failed to load model {}: {}",
                                thread_model_id,
                                reason
                            );
                            status_tx.send_replace(ModelStatus::Failed(reason.clone()));
                            Some(reason)
                        }
                    };

                    while let Some(payload) = rx.recv().await {
                        match payload {
                            ModelPayload::Process((items, result_tx)) => {
                                // If channel closed,
                                // we have no way to response, just ignore task.
                                if result_tx.is_closed() {
                                    continue;
                                }

                                let mut model = loader.model.lock().await;
                                let results = match model.as_mut() {
                                    Some(model) => process_in_batches(model, items).await,
                                    None => {
                                        tracing::error!("no valid model");
                                        Err(anyhow::anyhow!(GatewayError::ModelLoad(
                                            load_error.clone().unwrap_or_default()
                                        )))
                                    }
                                };

                                if result_tx.send(results).is_err() {
                                    tracing::error!("failed to send results");
                                }
                            }
                            ModelPayload::SetDevice(device, result_tx) => {
                                let loaded = loader.model.lock().await.is_some();
                                let result = if loaded {
                                    let mut model = loader.model.lock().await;
                                    match model.as_mut() {
                                        Some(model) => switch_device(model, device).await,
                                        None => Err(GatewayError::ModelLoad(
                                            load_error.clone().unwrap_or_default(),
                                        )),
                                    }
                                } else {
                                    // the first load failed, try again on the requested device
                                    status_tx.send_replace(ModelStatus::Loading);
                                    match loader.load(device).await {
                                        Ok(_) => {
                                            load_error = None;
                                            Ok(device)
                                        }
                                        Err(e) => {
                                            let reason = format!("{:#}", e);
                                            status_tx
                                                .send_replace(ModelStatus::Failed(reason.clone()));
                                            load_error = Some(reason.clone());
                                            Err(GatewayError::ModelLoad(reason))
                                        }
                                    }
                                };

                                match &result {
                                    Ok(device) => {
                                        tracing::info!(
                                            "model {} ready on {}",
                                            thread_model_id,
                                            device
                                        );
                                        status_tx.send_replace(ModelStatus::Ready(*device));
                                    }
                                    Err(e) => {
                                        tracing::warn!("device switch rejected: {}", e);
                                    }
                                }

                                if result_tx.send(result).is_err() {
                                    tracing::error!("failed to send device switch result");
                                }
                            }
                        }
                    }

                    // this means all tx has been dropped
                    tracing::debug!("all handles of {} dropped, offload model", thread_model_id);
                    if let Err(e) = loader.offload().await {
                        tracing::error!("failed to offload model: {}", e);
                    }
                });

                rt.block_on(local);
            })?;

        Ok(Self {
            model_id,
            tx,
            status: status_rx,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn status(&self) -> ModelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelStatus> {
        self.status.clone()
    }

    /// Resolves once loading has finished, with the device on success.
    pub async fn wait_until_ready(&self) -> GatewayResult<ComputeDevice> {
        let mut status = self.status.clone();
        let status = status
            .wait_for(|v| !matches!(v, ModelStatus::Loading))
            .await
            .map_err(|_| GatewayError::ChannelClosed)?;

        match &*status {
            ModelStatus::Ready(device) => Ok(*device),
            ModelStatus::Failed(reason) => Err(GatewayError::ModelLoad(reason.clone())),
            ModelStatus::Loading => Err(GatewayError::ChannelClosed),
        }
    }

    #[tracing::instrument(
        name = "AIModel::process",
        err(Debug),
        skip_all,
        fields(model_id = %self.model_id)
    )]
    pub async fn process(
        &self,
        items: Vec<TItem>,
    ) -> anyhow::Result<Vec<anyhow::Result<TOutput>>> {
        let (result_tx, rx) = oneshot::channel();
        if self
            .tx
            .send(ModelPayload::Process((items, result_tx)))
            .await
            .is_err()
        {
            anyhow::bail!(GatewayError::ChannelClosed);
        }
        tracing::debug!("items sent to model");

        match rx.await {
            Ok(result) => result,
            Err(e) => {
                anyhow::bail!("failed to receive results: {:?}", e);
            }
        }
    }

    /// Run one item. Failures of the item itself come back as [`GatewayError::Inference`].
    #[tracing::instrument(
        name = "AIModel::process_single",
        err(Debug),
        skip_all,
        fields(model_id = %self.model_id)
    )]
    pub async fn process_single(&self, item: TItem) -> GatewayResult<TOutput> {
        let results = self.process(vec![item]).await.map_err(into_gateway_error)?;
        match results.into_iter().next() {
            Some(Ok(output)) => Ok(output),
            Some(Err(e)) => Err(GatewayError::Inference(format!("{:#}", e))),
            None => Err(GatewayError::Inference("model returned no result".to_string())),
        }
    }

    #[tracing::instrument(
        name = "AIModel::set_device",
        err,
        skip(self),
        fields(model_id = %self.model_id)
    )]
    pub async fn set_device(&self, device: ComputeDevice) -> GatewayResult<ComputeDevice> {
        let (result_tx, rx) = oneshot::channel();
        self.tx
            .send(ModelPayload::SetDevice(device, result_tx))
            .await
            .map_err(|_| GatewayError::ChannelClosed)?;

        rx.await.map_err(|_| GatewayError::ChannelClosed)?
    }
}
