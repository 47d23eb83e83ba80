//! Snapshot export: cached frame → bitmap → rotation → JPEG file.

use std::path::{Path, PathBuf};

use log::warn;

use crate::cache::FrameCache;
use crate::error::{Error, Result};
use crate::jpeg::{Quality, encode};
use crate::reconstruct::{Bitmap, reconstruct};
use crate::rotate::rotate;

impl FrameCache {
    /// Bitmap of the current frame rotated clockwise by `rotation_degrees`.
    pub fn snapshot(&self, rotation_degrees: i32) -> Result<Bitmap> {
        let frame = self.current_frame().ok_or(Error::NoFrame)?;
        let bitmap = reconstruct(&frame, &self.config().color)?;
        rotate(bitmap, rotation_degrees)
    }

    /// Write the current frame to `path` as a JPEG and return `path`.
    ///
    /// `quality` is a percentage clamped to `1..=100`. Fails with
    /// [`Error::NoFrame`] without touching the filesystem when nothing has
    /// been cached yet. The cache itself is never affected by a failure.
    pub fn write_jpeg(
        &self,
        path: impl AsRef<Path>,
        rotation_degrees: i32,
        quality: i32,
    ) -> Result<PathBuf> {
        let path = path.as_ref();
        self.snapshot(rotation_degrees)
            .and_then(|bitmap| encode(&bitmap, path, Quality::from_percent(quality)))
            .inspect_err(|e| warn!("JPEG export to {} failed: {e}", path.display()))
    }
}
