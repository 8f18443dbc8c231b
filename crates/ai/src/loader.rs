use crate::{ComputeDevice, Model};
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

type CreateModelFn<T> =
    Box<dyn Fn(ComputeDevice) -> Pin<Box<dyn Future<Output = anyhow::Result<T>>>> + Send>;

pub(crate) struct ModelLoader<T>
where
    T: Model,
{
    pub model: Arc<Mutex<Option<T>>>,
    create_model_fn: CreateModelFn<T>,
}

impl<T> ModelLoader<T>
where
    T: Model,
{
    pub fn new<TFut, TFn>(create_model: TFn) -> Self
    where
        TFut: Future<Output = anyhow::Result<T>> + 'static,
        TFn: Fn(ComputeDevice) -> TFut + Send + 'static,
    {
        Self {
            model: Arc::new(Mutex::new(None)),
            create_model_fn: Box::new(move |device| Box::pin(create_model(device))),
        }
    }

    pub async fn load(&self, device: ComputeDevice) -> anyhow::Result<()> {
        let mut current_model = self.model.lock().await;

        if current_model.is_none() {
            debug!("loading model on {}", device);
            let model = (self.create_model_fn)(device).await?;
            *current_model = Some(model);
        }

        Ok(())
    }

    pub async fn offload(&self) -> anyhow::Result<()> {
        let mut current_model = self.model.lock().await;
        *current_model = None;

        Ok(())
    }
}
