use super::AIModel;
use std::path::{Path, PathBuf};

pub const DEFAULT_CAPTION_PROMPT: &str = "describe the image";

#[derive(Debug, Clone)]
pub struct ImageCaptionInput {
    pub image_file_path: PathBuf,
    pub prompt: Option<String>,
}

impl ImageCaptionInput {
    pub fn new(image_file_path: impl AsRef<Path>) -> Self {
        Self {
            image_file_path: image_file_path.as_ref().to_path_buf(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_CAPTION_PROMPT)
    }
}

pub type ImageCaptionOutput = String;
pub type ImageCaptionModel = AIModel<ImageCaptionInput, ImageCaptionOutput>;
