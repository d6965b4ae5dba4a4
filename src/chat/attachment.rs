//! Attachment Slot
//!
//! Holds at most one image pending for the next turn. Selecting a new image
//! replaces the previous one (the old preview is dropped with it); the slot
//! is cleared automatically only after the image has gone out with a
//! successful request.

use anyhow::{Context, Result};
use std::path::Path;

/// An image waiting to be sent with the next answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    /// Raw bytes shipped in the request.
    pub bytes: Vec<u8>,
    /// Filename reported to the backend.
    pub file_name: String,
    /// Display reference persisted into the resulting chat message.
    pub preview: String,
}

impl PendingImage {
    /// Load an image from disk; the preview reference is the source path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self {
            bytes,
            file_name,
            preview: path.display().to_string(),
        })
    }
}

/// Zero-or-one pending image.
#[derive(Debug, Default)]
pub struct AttachmentSlot {
    pending: Option<PendingImage>,
}

impl AttachmentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is pending. The previous image (and its preview)
    /// is dropped here, which is the invalidation.
    pub fn select(&mut self, image: PendingImage) {
        if let Some(old) = self.pending.replace(image) {
            tracing::debug!("attachment replaced: {}", old.preview);
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&PendingImage> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}
