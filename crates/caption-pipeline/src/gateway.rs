use ai::{moondream::Moondream, AIModel, ComputeDevice, ImageCaptionModel};
use file_downloader::{FileDownload, FileDownloadConfig};
use std::path::PathBuf;

pub const MOONDREAM_MODEL_ID: &str = "moondream2";

#[derive(Debug, Clone)]
pub struct ModelArtifact {
    /// Path under the download base url.
    pub uri: String,
    /// Path under the resources dir.
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct MoondreamConfig {
    pub resources_dir: PathBuf,
    pub download_url: String,
    pub model: ModelArtifact,
    pub tokenizer: ModelArtifact,
}

impl Default for MoondreamConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("resources"),
            download_url: "https://huggingface.co".to_string(),
            model: ModelArtifact {
                uri: "santiagomed/candle-moondream/resolve/main/model-q4_0.gguf".to_string(),
                file_name: "moondream/model-q4_0.gguf".to_string(),
            },
            tokenizer: ModelArtifact {
                uri: "vikhyatk/moondream2/resolve/main/tokenizer.json".to_string(),
                file_name: "moondream/tokenizer.json".to_string(),
            },
        }
    }
}

/// Start the Moondream captioner in the background. Missing artifacts are fetched first;
/// a failed fetch shows up as a load failure on the returned handle.
pub fn moondream_caption_model(
    config: MoondreamConfig,
    device: ComputeDevice,
) -> anyhow::Result<ImageCaptionModel> {
    AIModel::new(
        MOONDREAM_MODEL_ID,
        move |device| {
            let config = config.clone();
            async move {
                let download = FileDownload::new(FileDownloadConfig {
                    url: config.download_url.clone(),
                    resources_dir: config.resources_dir.clone(),
                });
                let model_path = download
                    .download_if_not_exists(&config.model.uri, &config.model.file_name)
                    .await?;
                let tokenizer_path = download
                    .download_if_not_exists(&config.tokenizer.uri, &config.tokenizer.file_name)
                    .await?;

                Moondream::new(model_path, tokenizer_path, device).await
            }
        },
        device,
    )
}
