use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::info;

pub struct FileDownloadConfig {
    pub url: String,
    pub resources_dir: PathBuf,
}

pub struct FileDownload {
    url: String,
    resources_dir: PathBuf,
}

impl Default for FileDownloadConfig {
    fn default() -> Self {
        Self {
            url: "https://huggingface.co".to_string(),
            resources_dir: PathBuf::from("resources"),
        }
    }
}

impl FileDownload {
    pub fn new(config: FileDownloadConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            resources_dir: config.resources_dir,
        }
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    pub fn download_url(&self, uri: &str) -> String {
        format!("{}/{}", self.url, uri.trim_start_matches('/'))
    }

    /// Fetch `uri` into `file_path` unless the file is already there.
    /// Data lands in a `.temp` sibling first, so an interrupted download never looks complete.
    pub async fn download_to_path_if_not_exists(
        &self,
        uri: &str,
        file_path: impl AsRef<Path>,
    ) -> anyhow::Result<PathBuf> {
        let file_path = file_path.as_ref().to_path_buf();
        info!("check file path: {:?}", file_path);
        if fs::try_exists(&file_path).await.unwrap_or(false) {
            return Ok(file_path);
        }

        let temp_download_path = file_path.with_extension("temp");
        let download_url = self.download_url(uri);

        let mut response = reqwest::get(&download_url)
            .await
            .and_then(|v| v.error_for_status())
            .with_context(|| format!("failed to download {}", download_url))?;

        // create parent folder
        if let Some(parent_dir) = file_path.parent() {
            fs::create_dir_all(parent_dir).await?;
        }

        let mut file = File::create(&temp_download_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        fs::rename(&temp_download_path, &file_path).await?;

        info!("file {:?} downloaded", file_path);

        Ok(file_path)
    }

    pub async fn download_if_not_exists(
        &self,
        uri: &str,
        file_name: impl AsRef<Path>,
    ) -> anyhow::Result<PathBuf> {
        let file_path = self.resources_dir.join(file_name);
        self.download_to_path_if_not_exists(uri, file_path).await
    }
}

#[cfg(test)]
mod test {
    use super::{FileDownload, FileDownloadConfig};

    #[test]
    fn test_download_url() {
        let download = FileDownload::new(FileDownloadConfig {
            url: "https://huggingface.co/".into(),
            ..Default::default()
        });

        assert_eq!(
            download.download_url("/vikhyatk/moondream2/resolve/main/tokenizer.json"),
            "https://huggingface.co/vikhyatk/moondream2/resolve/main/tokenizer.json"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_existing_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();

        // unroutable url, any network access would fail the test
        let download = FileDownload::new(FileDownloadConfig {
            url: "http://127.0.0.1:9".into(),
            resources_dir: dir.path().to_path_buf(),
        });

        let path = download
            .download_if_not_exists("moondream/tokenizer.json", "tokenizer.json")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("tokenizer.json"));
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_download_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let download = FileDownload::new(FileDownloadConfig {
            url: "http://127.0.0.1:9".into(),
            resources_dir: dir.path().to_path_buf(),
        });

        let res = download
            .download_if_not_exists("moondream/model.gguf", "model.gguf")
            .await;
        assert!(res.is_err());
        assert!(!dir.path().join("model.gguf").exists());
    }
}
