use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("model thread has stopped")]
    ChannelClosed,
}
