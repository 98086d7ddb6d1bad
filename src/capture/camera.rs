//! Camera implementations.

use crate::capture::{Camera, EncodedImage};
use crate::error::{Result, VisionError};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Replays the JPEG files of a directory in name order, looping forever.
///
/// Stands in for a live camera when frames were recorded beforehand. Files are
/// read once at open so captures never touch the filesystem.
#[derive(Debug)]
pub struct ImageDirCamera {
    frames: Vec<Vec<u8>>,
    next: usize,
}

impl ImageDirCamera {
    /// Load the `.jpg`/`.jpeg` files in `dir`. Empty files are skipped.
    ///
    /// An empty directory is accepted; captures then report no frame.
    ///
    /// # Errors
    /// Returns `VisionError::Capture` if the directory or one of its images
    /// cannot be read.
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| VisionError::Capture {
            message: format!("Failed to read image directory {}: {}", dir.display(), e),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_jpeg(path))
            .collect();
        files.sort();

        let mut frames = Vec::with_capacity(files.len());
        for path in &files {
            let bytes = fs::read(path).map_err(|e| VisionError::Capture {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;
            if bytes.is_empty() {
                debug!(path = %path.display(), "skipping empty image file");
                continue;
            }
            frames.push(bytes);
        }

        info!(dir = %dir.display(), frames = frames.len(), "image directory camera ready");

        Ok(Self { frames, next: 0 })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

impl Camera for ImageDirCamera {
    fn capture(&mut self) -> Result<Option<EncodedImage>> {
        let Some(frame) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let image = EncodedImage::Jpeg(frame.clone());
        self.next = (self.next + 1) % self.frames.len();
        Ok(Some(image))
    }

    fn name(&self) -> &'static str {
        "image-dir"
    }
}

/// Camera that never has a frame, used when no image source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleCamera;

impl Camera for IdleCamera {
    fn capture(&mut self) -> Result<Option<EncodedImage>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "idle"
    }
}

/// Mock camera for testing.
///
/// Replays scripted outcomes in order, then keeps returning the default frame.
#[derive(Debug)]
pub struct MockCamera {
    script: VecDeque<MockShot>,
    frame: EncodedImage,
    should_fail: bool,
    error_message: String,
    captures: Arc<AtomicUsize>,
}

#[derive(Debug)]
enum MockShot {
    Frame(EncodedImage),
    NotReady,
    Failure,
}

impl MockCamera {
    /// Create a mock camera returning a small JPEG data URL on every capture
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            frame: EncodedImage::DataUrl("data:image/jpeg;base64,/9j/4AAQSkZJRg==".to_string()),
            should_fail: false,
            error_message: "mock camera error".to_string(),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the frame returned once the script is exhausted
    pub fn with_frame(mut self, frame: EncodedImage) -> Self {
        self.frame = frame;
        self
    }

    /// Queue one scripted frame
    pub fn then_frame(mut self, frame: EncodedImage) -> Self {
        self.script.push_back(MockShot::Frame(frame));
        self
    }

    /// Queue one capture that yields no data
    pub fn then_not_ready(mut self) -> Self {
        self.script.push_back(MockShot::NotReady);
        self
    }

    /// Queue one failing capture
    pub fn then_failure(mut self) -> Self {
        self.script.push_back(MockShot::Failure);
        self
    }

    /// Configure every capture after the script to fail
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Shared counter of capture calls, readable after the camera moved away
    pub fn capture_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.captures)
    }

    fn failure(&self) -> VisionError {
        VisionError::Capture {
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for MockCamera {
    fn capture(&mut self) -> Result<Option<EncodedImage>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(MockShot::Frame(frame)) => Ok(Some(frame)),
            Some(MockShot::NotReady) => Ok(None),
            Some(MockShot::Failure) => Err(self.failure()),
            None if self.should_fail => Err(self.failure()),
            None => Ok(Some(self.frame.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
