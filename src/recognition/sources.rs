//! External collaborators: frames, reference images and vision labeling
//!
//! The engine only depends on the traits; the directory-backed
//! implementations serve the CLI and tests.

use super::labels::slug;
use image::RgbImage;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Source of live frames
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `None` when nothing is available right now
    fn latest_frame(&self) -> impl Future<Output = Option<RgbImage>> + Send;
}

/// Provider of one canonical reference image per label (usually network backed)
pub trait ReferenceImageProvider: Send + Sync {
    /// Encoded image bytes (PNG, JPEG, WebP) for `label`
    fn fetch(&self, label: &str) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}

/// Provider that names the item shown in each crop
pub trait VisionLabeler: Send + Sync {
    /// One answer per image, in order, each meant to be one of `allowed`
    fn label(
        &self,
        images: &[RgbImage],
        allowed: &[String],
    ) -> impl Future<Output = Result<Vec<String>, String>> + Send;
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Reads `<slug>.<png|jpg|jpeg|webp>` from a directory
pub struct DirectoryReferenceProvider {
    directory: PathBuf,
}

impl DirectoryReferenceProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl ReferenceImageProvider for DirectoryReferenceProvider {
    async fn fetch(&self, label: &str) -> Result<Vec<u8>, String> {
        let stem = slug(label);
        for ext in IMAGE_EXTENSIONS {
            let path = self.directory.join(format!("{}.{}", stem, ext));
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(format!("Failed to read {:?}: {}", path, e)),
            }
        }
        Err(format!(
            "No reference image for '{}' ({}.png|jpg|jpeg|webp) in {:?}",
            label, stem, self.directory
        ))
    }
}

/// Serves the image files of a directory in name order, one per call
pub struct FrameSequenceSource {
    paths: Vec<PathBuf>,
    cursor: Mutex<usize>,
    loop_playback: bool,
}

impl FrameSequenceSource {
    pub fn from_directory(directory: &Path, loop_playback: bool) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_file(p))
            .collect();
        paths.sort();
        log::info!("Frame sequence: {} frames in {:?}", paths.len(), directory);
        Ok(Self {
            paths,
            cursor: Mutex::new(0),
            loop_playback,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// True once every frame was served and looping is off
    pub fn is_exhausted(&self) -> bool {
        !self.loop_playback && self.cursor.lock().map_or(true, |c| *c >= self.paths.len())
    }

    fn next_path(&self) -> Option<PathBuf> {
        let mut cursor = self.cursor.lock().ok()?;
        if self.paths.is_empty() {
            return None;
        }
        if *cursor >= self.paths.len() {
            if !self.loop_playback {
                return None;
            }
            *cursor = 0;
        }
        let path = self.paths[*cursor].clone();
        *cursor += 1;
        Some(path)
    }
}

impl FrameSource for FrameSequenceSource {
    async fn latest_frame(&self) -> Option<RgbImage> {
        let path = self.next_path()?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to read frame {:?}: {}", path, e);
                return None;
            }
        };
        match image::load_from_memory(&bytes) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                log::warn!("Failed to decode frame {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Latest-frame slot a host pushes captures into
#[derive(Clone, Default)]
pub struct StaticFrameSource {
    frame: Arc<Mutex<Option<Arc<RgbImage>>>>,
}

impl StaticFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: RgbImage) {
        if let Ok(mut slot) = self.frame.lock() {
            *slot = Some(Arc::new(frame));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.frame.lock() {
            *slot = None;
        }
    }
}

impl FrameSource for StaticFrameSource {
    async fn latest_frame(&self) -> Option<RgbImage> {
        let frame = self.frame.lock().ok()?.clone()?;
        Some(frame.as_ref().clone())
    }
}
