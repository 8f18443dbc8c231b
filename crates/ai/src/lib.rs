mod device;
mod error;
mod loader;
mod traits;

pub mod moondream;

pub use device::ComputeDevice;
pub use error::{GatewayError, GatewayResult};
pub use traits::*;

use tokio::sync::oneshot;

pub type HandlerPayload<TItem, TOutput> = (
    Vec<TItem>,
    oneshot::Sender<anyhow::Result<Vec<anyhow::Result<TOutput>>>>,
);
