//! Frame capture: camera abstraction and the fixed-rate capture loop.

pub mod camera;
pub mod frame_source;

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub use camera::{IdleCamera, ImageDirCamera, MockCamera};
pub use frame_source::FrameSource;

/// An encoded still image as produced by a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedImage {
    /// A `data:` URL such as `data:image/jpeg;base64,<payload>`.
    DataUrl(String),
    /// Raw JPEG bytes.
    Jpeg(Vec<u8>),
}

impl EncodedImage {
    /// The base64 payload with any encoding-scheme header stripped.
    ///
    /// Returns `None` when the image carries no data.
    pub fn payload(&self) -> Option<String> {
        match self {
            Self::DataUrl(url) => {
                let (_, payload) = url.split_once(',')?;
                (!payload.is_empty()).then(|| payload.to_string())
            }
            Self::Jpeg(bytes) if bytes.is_empty() => None,
            Self::Jpeg(bytes) => Some(STANDARD.encode(bytes)),
        }
    }
}

/// A source of still images.
pub trait Camera: Send {
    /// Capture one still.
    ///
    /// `Ok(None)` means no frame is available yet (camera warming up).
    fn capture(&mut self) -> Result<Option<EncodedImage>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Destination for captured frame payloads.
pub trait FrameSink: Send + Sync {
    /// Hand over one payload. Returns false when the sink dropped it.
    fn send_frame(&self, payload: String) -> bool;
}

impl FrameSink for crate::connection::ConnectionHandle {
    fn send_frame(&self, payload: String) -> bool {
        self.send(payload)
    }
}
