use crate::ProcessingState;
use ai::GatewayError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("model unavailable: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("captions are not ready for export (state: {0}), please wait until all images are processed")]
    NotReady(ProcessingState),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no images selected")]
    EmptySelection,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("captioning task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
