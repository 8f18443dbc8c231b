use crate::{CaptionCache, ExportError, ImageRef, ProcessingState};
use std::path::PathBuf;

#[derive(Debug)]
pub struct ExportFailure {
    pub image: ImageRef,
    pub path: PathBuf,
    pub error: std::io::Error,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every cached caption to `<image base name>.txt` beside its image,
/// overwriting existing files. Nothing is written unless `state` is `Completed`.
/// A failed write is recorded in the report and the remaining files are still written.
pub async fn export(
    cache: &CaptionCache,
    images: &[ImageRef],
    state: ProcessingState,
) -> Result<ExportReport, ExportError> {
    if state != ProcessingState::Completed {
        return Err(ExportError::NotReady(state));
    }

    let mut report = ExportReport::default();

    for image in images {
        let Some(caption) = cache.get(image) else {
            tracing::warn!("no caption for {}, skip export", image);
            continue;
        };

        let path = image.sidecar_path();
        match tokio::fs::write(&path, caption.text().as_bytes()).await {
            Ok(_) => {
                tracing::debug!("caption exported to {}", path.display());
                report.written.push(path);
            }
            Err(error) => {
                tracing::error!("failed to export caption to {}: {}", path.display(), error);
                report.failed.push(ExportFailure {
                    image: image.clone(),
                    path,
                    error,
                });
            }
        }
    }

    tracing::info!(
        "exported {} captions, {} failed",
        report.written.len(),
        report.failed.len()
    );

    Ok(report)
}

#[cfg(test)]
mod test {
    use super::export;
    use crate::{Caption, CaptionCache, ExportError, ImageRef, ProcessingState};

    #[test_log::test(tokio::test)]
    async fn test_not_ready_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image = ImageRef::new(dir.path().join("a.png"));
        let cache = CaptionCache::new();
        cache.put(image.clone(), Caption::Ok("a tree".into()));

        for state in [
            ProcessingState::Idle,
            ProcessingState::Loading,
            ProcessingState::Running,
        ] {
            let res = export(&cache, &[image.clone()], state).await;
            assert_eq!(res.unwrap_err(), ExportError::NotReady(state));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_writes_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let a = ImageRef::new(dir.path().join("a.png"));
        let b = ImageRef::new(dir.path().join("b.jpeg"));
        std::fs::write(dir.path().join("a.txt"), "stale caption").unwrap();

        let cache = CaptionCache::new();
        cache.put(a.clone(), Caption::Ok("a tree".into()));
        cache.put(b.clone(), Caption::Failed("bad header".into()));

        let report = export(&cache, &[a, b], ProcessingState::Completed)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "a tree"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("b.txt")).unwrap(),
            "Error: bad header"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_write_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ImageRef::new(dir.path().join("gone").join("a.png"));
        let ok = ImageRef::new(dir.path().join("b.png"));

        let cache = CaptionCache::new();
        cache.put(missing.clone(), Caption::Ok("lost".into()));
        cache.put(ok.clone(), Caption::Ok("kept".into()));

        let report = export(&cache, &[missing.clone(), ok], ProcessingState::Completed)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].image, missing);
        assert_eq!(report.written, vec![dir.path().join("b.txt")]);
    }
}
