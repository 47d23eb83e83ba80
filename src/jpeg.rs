//! JPEG output.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::reconstruct::Bitmap;

/// JPEG quality in percent, clamped to `1..=100`.
///
/// Requests of 0 and 1 both map to the lowest quality the encoder offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(1);
    pub const MAX: Quality = Quality(100);

    pub fn from_percent(percent: i32) -> Self {
        Quality(percent.clamp(1, 100) as u8)
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// Quality as a `0.0..=1.0` compression-quality factor, for encoders that
    /// take a fraction. [`encode`] passes [`percent`](Self::percent) because
    /// the `image` JPEG encoder takes the integer form.
    pub fn as_fraction(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

/// Encode `bitmap` as a JPEG at `path`, creating missing parent directories.
///
/// The data is written to a temporary file next to `path` and only renamed
/// into place once the encoder finished, so a failed write never leaves a
/// truncated file at `path`. No EXIF or orientation block is written; alpha
/// is dropped. Returns `path` on success.
pub fn encode(bitmap: &Bitmap, path: impl AsRef<Path>, quality: Quality) -> Result<PathBuf> {
    let path = path.as_ref();
    if bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(Error::NoFrame);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(Error::DestinationCreateFailed)?;

    let mut part = tempfile::Builder::new()
        .prefix(".frame-")
        .suffix(".jpg.part")
        .tempfile_in(dir)
        .map_err(Error::DestinationCreateFailed)?;

    let rgb = RgbImage::from_fn(bitmap.width(), bitmap.height(), |x, y| {
        let [r, g, b, _] = bitmap.get_pixel(x, y).0;
        Rgb([r, g, b])
    });

    {
        let mut writer = BufWriter::new(part.as_file_mut());
        JpegEncoder::new_with_quality(&mut writer, quality.percent())
            .encode_image(&rgb)
            .map_err(|e| Error::EncodeFinalizeFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| Error::EncodeFinalizeFailed(e.to_string()))?;
    }

    part.persist(path)
        .map_err(|e| Error::DestinationCreateFailed(e.error))?;
    Ok(path.to_path_buf())
}
