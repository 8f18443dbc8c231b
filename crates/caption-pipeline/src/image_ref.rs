use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A selected source image. Cheap to clone, never changes after selection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageRef(Arc<Path>);

impl ImageRef {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// `<dir>/<base name>.txt`, next to the image.
    pub fn sidecar_path(&self) -> PathBuf {
        self.0.with_extension("txt")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for ImageRef {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for ImageRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod test {
    use super::ImageRef;
    use std::path::PathBuf;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            ImageRef::from("/photos/a.png").sidecar_path(),
            PathBuf::from("/photos/a.txt")
        );
        assert_eq!(
            ImageRef::from("/photos/archive.tar.gz").sidecar_path(),
            PathBuf::from("/photos/archive.tar.txt")
        );
        assert_eq!(
            ImageRef::from("/photos/raw").sidecar_path(),
            PathBuf::from("/photos/raw.txt")
        );
    }

    #[test]
    fn test_equality_by_path() {
        let a = ImageRef::from("a.png");
        assert_eq!(a, ImageRef::from(PathBuf::from("a.png")));
        assert_ne!(a, ImageRef::from("b.png"));
        assert_eq!(a.to_string(), "a.png");
    }
}
