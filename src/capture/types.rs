// Core types for the capture boundary

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::actor::Actor;
use crate::codec::{CodecError, PixelBuffer};

/// Result of a capture operation
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Name of the actor this frame belongs to
    pub actor: String,
    /// Full-surface RGBA raster
    pub image: PixelBuffer,
    /// Optional metadata about the capture
    pub metadata: Option<serde_json::Value>,
}

impl CaptureResult {
    pub fn new(actor: impl Into<String>, image: PixelBuffer) -> Self {
        Self {
            actor: actor.into(),
            image,
            metadata: None,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Trait for capture providers
///
/// Implementations produce a raster for an actor:
/// - `DirectorySource` for pre-rendered images on disk
/// - `MockProvider` for scripted frames, failures and delays in tests
///
/// Captures may run on several blocking threads at once, so providers take
/// `&self` and must be `Send + Sync`.
pub trait CaptureProvider: Send + Sync {
    /// Capture the current rendering for `actor`
    fn capture(&self, actor: &Actor) -> CaptureOutcome<CaptureResult>;

    /// Get the source type identifier (e.g., "directory", "mock")
    fn source_type(&self) -> &str;
}

/// Result type for capture operations
pub type CaptureOutcome<T> = Result<T, CaptureError>;

/// Error types for capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The provider could not produce a frame
    #[error("Capture error: {0}")]
    Backend(String),

    /// The capture did not finish before its deadline
    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    /// The run deadline passed before the capture started
    #[error("Run deadline passed before capture started")]
    DeadlineExceeded,

    /// `capture.file` points outside the source directory
    #[error("Source file must be a relative path inside the source directory: {0}")]
    InvalidSource(String),

    /// Pre-rendered source image does not exist
    #[error("Source image not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Frame bytes could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether this error represents a timeout rather than a provider failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, CaptureError::Timeout(_) | CaptureError::DeadlineExceeded)
    }
}
