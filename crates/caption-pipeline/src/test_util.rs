use ai::{AIModel, ComputeDevice, ImageCaptionInput, ImageCaptionModel, ImageCaptionOutput, Model};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Stand-in for a real captioner: decodes the image and describes its size.
/// Accepts cpu and cuda, never metal.
pub(crate) struct DecodingModel {
    device: ComputeDevice,
    delay: Duration,
}

impl Model for DecodingModel {
    type Item = ImageCaptionInput;
    type Output = ImageCaptionOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }

    async fn set_device(&mut self, device: ComputeDevice) -> anyhow::Result<()> {
        if device == ComputeDevice::Metal {
            anyhow::bail!("metal is not attached");
        }
        self.device = device;
        Ok(())
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        let mut results = vec![];
        for item in items {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = image::open(&item.image_file_path)
                .map(|v| format!("a {}x{} picture ({})", v.width(), v.height(), self.device))
                .map_err(|e| anyhow::anyhow!(e));
            results.push(result);
        }
        Ok(results)
    }
}

pub(crate) fn decoding_model(delay: Duration) -> ImageCaptionModel {
    AIModel::new(
        "decoding",
        move |device| async move { Ok::<_, anyhow::Error>(DecodingModel { device, delay }) },
        ComputeDevice::Cpu,
    )
    .expect("create decoding model")
}

pub(crate) fn broken_model() -> ImageCaptionModel {
    AIModel::new(
        "broken",
        |_device| async move {
            let result: anyhow::Result<DecodingModel> =
                Err(anyhow::anyhow!("weights not found"));
            result
        },
        ComputeDevice::Cpu,
    )
    .expect("create broken model")
}

pub(crate) fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 30]))
        .save(&path)
        .expect("write png");
    path
}

pub(crate) fn write_empty(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").expect("write empty file");
    path
}
