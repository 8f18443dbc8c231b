#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use crate::traits::{ImageCaptionInput, ImageCaptionOutput};
use crate::{ComputeDevice, Model};
use anyhow::{anyhow, bail};
use candle_core::{DType, Device, Tensor};
use candle_transformers::{
    generation::LogitsProcessor,
    models::{moondream, quantized_moondream},
};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::debug;

const IMAGE_SIZE: usize = 378;
const SEED: u64 = 1337;
const END_SEQUENCE: [u32; 3] = [27, 10619, 29]; // <END>

pub struct Moondream {
    model: quantized_moondream::Model,
    model_path: PathBuf,
    device: Device,
    compute_device: ComputeDevice,
    tokenizer: Tokenizer,
    logits_processor: LogitsProcessor,
    repeat_penalty: f32,
    repeat_last_n: usize,
    max_new_tokens: usize,
}

impl Model for Moondream {
    type Item = ImageCaptionInput;
    type Output = ImageCaptionOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    fn device(&self) -> ComputeDevice {
        self.compute_device
    }

    async fn set_device(&mut self, device: ComputeDevice) -> anyhow::Result<()> {
        // weights are bound to a device, so reload them and swap only on success
        let candle_device = device.open()?;
        let model = load_weights(&self.model_path, &candle_device)?;

        self.model = model;
        self.device = candle_device;
        self.compute_device = device;

        Ok(())
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let mut results = vec![];

        for item in items {
            let res = self.generate(item.prompt(), &item.image_file_path);
            results.push(res);
        }

        Ok(results)
    }
}

fn load_weights(
    model_path: impl AsRef<Path>,
    device: &Device,
) -> anyhow::Result<quantized_moondream::Model> {
    let config = moondream::Config::v2();
    let vb = candle_transformers::quantized_var_builder::VarBuilder::from_gguf(
        model_path.as_ref(),
        device,
    )?;
    Ok(quantized_moondream::Model::new(&config, vb)?)
}

impl Moondream {
    pub async fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        device: ComputeDevice,
    ) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;

        let logits_processor = LogitsProcessor::new(SEED, None, None);

        let candle_device = device.open()?;
        let model = load_weights(&model_path, &candle_device)?;

        Ok(Self {
            model,
            model_path: model_path.as_ref().to_path_buf(),
            tokenizer,
            device: candle_device,
            compute_device: device,
            logits_processor,
            repeat_last_n: 64,
            repeat_penalty: 1.0,
            max_new_tokens: 512,
        })
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    fn generate(&mut self, prompt: &str, image_path: impl AsRef<Path>) -> anyhow::Result<String> {
        debug!("generating caption for {}", image_path.as_ref().display());

        let image = load_image(image_path)?
            .to_device(&self.device)?
            .to_dtype(DType::F32)?;
        let image_embeds = image.unsqueeze(0)?.apply(&self.model.vision_encoder)?;

        // every caption starts from an empty context
        self.model.text_model.clear_kv_cache();

        let prompt = format!("\n\nQuestion: {0}\n\nAnswer:", prompt);
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!(e))?;
        if tokens.is_empty() {
            bail!("Empty prompts are not supported in the Moondream model.")
        }

        let mut tokens = tokens.get_ids().to_vec();

        // Moondream tokenizer bos_token and eos_token is "<|endoftext|>"
        // https://huggingface.co/vikhyatk/moondream2/blob/main/special_tokens_map.json
        let special_token = match self.tokenizer.get_vocab(true).get("<|endoftext|>") {
            Some(token) => *token,
            None => bail!("cannot find the special token"),
        };
        let (bos_token, eos_token) = (special_token, special_token);

        let mut token_ids = vec![];

        for index in 0..self.max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = if index > 0 {
                self.model.text_model.forward(&input)?
            } else {
                let bos_token = Tensor::new(&[bos_token], &self.device)?.unsqueeze(0)?;
                self.model
                    .text_model
                    .forward_with_img(&bos_token, &input, &image_embeds)?
            };

            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if self.repeat_penalty == 1. {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.repeat_penalty,
                    &tokens[start_at..],
                )?
            };
            let next_token = self.logits_processor.sample(&logits)?;
            tokens.push(next_token);
            if next_token == eos_token || tokens.ends_with(&END_SEQUENCE) {
                break;
            }
            token_ids.push(next_token);
        }

        let result = self.tokenizer.decode(&token_ids, true);

        result
            .map_err(|e| anyhow!("failed to generate result: {}", e))
            .map(|v| v.trim().to_string())
    }
}

/// Loads an image from disk using the image crate, this returns a tensor with shape
/// (3, 378, 378).
pub fn load_image<P: AsRef<Path>>(p: P) -> candle_core::Result<Tensor> {
    let img = image::open(p)
        .map_err(candle_core::Error::wrap)?
        .resize_to_fill(
            IMAGE_SIZE as u32,
            IMAGE_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );
    let img = img.to_rgb8();
    let data = img.into_raw();
    let data =
        Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&[0.5f32, 0.5, 0.5], &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&[0.5f32, 0.5, 0.5], &Device::Cpu)?.reshape((3, 1, 1))?;
    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}

#[cfg(test)]
mod test {
    use super::{load_image, Moondream};
    use crate::{ComputeDevice, ImageCaptionInput, Model};

    #[test]
    fn test_load_image_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        image::RgbImage::from_pixel(40, 20, image::Rgb([255, 0, 0]))
            .save(&path)
            .unwrap();

        let tensor = load_image(&path).unwrap();
        assert_eq!(tensor.dims(), &[3, 378, 378]);
    }

    #[test]
    fn test_load_image_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();

        assert!(load_image(&path).is_err());
    }

    /// Needs the quantized weights, run with
    /// `MOONDREAM_DIR=/path/to/moondream cargo test -p ai -- --ignored`
    #[ignore]
    #[test_log::test(tokio::test)]
    async fn test_moondream() {
        let dir = std::path::PathBuf::from(std::env::var("MOONDREAM_DIR").unwrap());
        let mut moondream = Moondream::new(
            dir.join("model-q4_0.gguf"),
            dir.join("tokenizer.json"),
            ComputeDevice::preferred(),
        )
        .await
        .expect("failed to load model");

        let start = std::time::Instant::now();
        let results = moondream
            .process(vec![ImageCaptionInput::new(dir.join("test.jpg"))])
            .await
            .unwrap();
        tracing::info!("response: {:?}", results);
        tracing::info!("Time elapsed in execution is: {:?}", start.elapsed());

        assert!(results[0].is_ok());
    }
}
