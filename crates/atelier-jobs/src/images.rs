//! Loading stored product images for vision prompts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use atelier_core::{Error, ImagePart, ProductImage, Result};

/// Environment variable naming the directory image paths are relative to.
pub const ENV_MEDIA_ROOT: &str = "ATELIER_MEDIA_ROOT";

/// Reads image bytes for a stored product image.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, image: &ProductImage) -> Result<Vec<u8>>;
}

/// Loads images from the local filesystem.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    media_root: PathBuf,
}

impl FsImageLoader {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// Use `ATELIER_MEDIA_ROOT`, defaulting to the working directory.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENV_MEDIA_ROOT).unwrap_or_else(|_| ".".to_string()))
    }

    /// Absolute paths are used as-is; relative ones resolve under the root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.media_root.join(p)
        }
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, image: &ProductImage) -> Result<Vec<u8>> {
        let path = self.resolve(&image.path);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            Error::Job(format!("Cannot read image {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), bytes = data.len(), "Loaded image");
        Ok(data)
    }
}

/// Load an image as a generation payload with the given MIME type.
pub async fn load_part(
    loader: &dyn ImageLoader,
    image: &ProductImage,
    mime_type: &str,
) -> Result<ImagePart> {
    Ok(ImagePart::new(loader.load(image).await?, mime_type))
}
