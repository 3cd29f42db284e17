use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stored photos are resized to this width; height keeps the aspect ratio.
pub const PHOTO_WIDTH: u32 = 800;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("That filetype isn't allowed!")]
    NotAnImage,

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not process image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Could not store image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image task failed: {0}")]
    Task(String),
}

/// Manages uploaded store photos on disk.
///
/// Each photo is a flat file at `{dir}/{uuid}.{ext}`, served back under `/uploads`.
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub async fn new(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Photo upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Resize and persist an uploaded photo. Returns the generated filename.
    ///
    /// The MIME type is checked before anything is decoded or written.
    pub async fn save(&self, content_type: &str, data: Bytes) -> Result<String, PhotoError> {
        let extension = photo_extension(content_type)?;
        let format = ImageFormat::from_extension(&extension)
            .ok_or_else(|| PhotoError::UnsupportedFormat(extension.clone()))?;

        let encoded = tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&data)?;
            encode(&resize_to_width(&img, PHOTO_WIDTH), format)
        })
        .await
        .map_err(|e| PhotoError::Task(e.to_string()))??;

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        fs::write(self.file_path(&filename), &encoded).await?;
        debug!("Stored photo {} ({} bytes)", filename, encoded.len());
        Ok(filename)
    }

    /// Delete a stored photo. A file that is already gone is not an error.
    pub async fn remove(&self, filename: &str) {
        match fs::remove_file(self.file_path(filename)).await {
            Ok(()) => debug!("Removed photo {}", filename),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove photo {}: {}", filename, e),
        }
    }
}

/// File extension for an upload, taken from the MIME subtype.
/// Anything that is not `image/*` is rejected.
pub fn photo_extension(content_type: &str) -> Result<String, PhotoError> {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.strip_prefix("image/") {
        Some(subtype) if !subtype.is_empty() => Ok(subtype.to_string()),
        _ => Err(PhotoError::NotAnImage),
    }
}

/// Scale to `width`, keeping the aspect ratio.
pub fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let height = ((img.height() as f64) * (width as f64) / (img.width().max(1) as f64))
        .round()
        .max(1.0) as u32;
    img.resize_exact(width, height, FilterType::Triangle)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, PhotoError> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, format)?,
        _ => img.write_to(&mut buf, format)?,
    }
    Ok(buf.into_inner())
}
