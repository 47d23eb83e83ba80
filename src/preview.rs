//! Transport-ready description of the cached frame.

use core::ops::Deref;
use std::sync::Arc;

use arrayvec::ArrayVec;
use serde::{Serialize, Serializer};

use crate::cache::StoredFrame;
use crate::frame::MAX_PLANES;
use crate::normalize::{PACKED4_BYTES_PER_PIXEL, PixelLayout};
use crate::types::{CaptureMetadata, PixelFormat};

/// Bytes of one plane, either shared with the cache generation or copied.
///
/// `Shared` buffers are read-only views; the generation they belong to stays
/// alive as long as the view does, even after the cache moved on.
#[derive(Debug, Clone)]
pub enum PlaneBytes {
    Shared(Arc<[u8]>),
    Owned(Vec<u8>),
}

impl PlaneBytes {
    fn from_cache(bytes: &Arc<[u8]>, copy: bool) -> Self {
        if copy {
            PlaneBytes::Owned(bytes.to_vec())
        } else {
            PlaneBytes::Shared(Arc::clone(bytes))
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, PlaneBytes::Shared(_))
    }
}

impl Deref for PlaneBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            PlaneBytes::Shared(bytes) => bytes,
            PlaneBytes::Owned(bytes) => bytes,
        }
    }
}

impl Serialize for PlaneBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self)
    }
}

/// One plane of a [`PreviewDescriptor`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneDescriptor {
    pub bytes: PlaneBytes,
    pub bytes_per_row: usize,
    pub bytes_per_pixel: usize,
    pub width: u32,
    pub height: u32,
}

/// The cached frame as handed across the plugin boundary.
///
/// `format` is the four-character code of the layout: `'420f'` for
/// biplanar frames (whatever range they were captured in) and `'BGRA'` for
/// packed ones. When metadata embedding is enabled the three capture
/// metadata keys are always present, `null` when unknown.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewDescriptor {
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub planes: ArrayVec<PlaneDescriptor, MAX_PLANES>,
    #[serde(flatten)]
    pub metadata: Option<CaptureMetadata>,
}

impl PreviewDescriptor {
    /// Describe `frame`. With `copy_bytes` every plane is an independent copy;
    /// otherwise planes are shared views of the cached buffers.
    pub fn build(
        frame: &StoredFrame,
        metadata: Option<CaptureMetadata>,
        copy_bytes: bool,
    ) -> Self {
        let (width, height) = (frame.size.width, frame.size.height);
        let mut planes = ArrayVec::new();

        let format = match &frame.layout {
            PixelLayout::Biplanar { luma, chroma } => {
                planes.push(PlaneDescriptor {
                    bytes: PlaneBytes::from_cache(luma, copy_bytes),
                    bytes_per_row: width as usize,
                    bytes_per_pixel: 1,
                    width,
                    height,
                });
                planes.push(PlaneDescriptor {
                    bytes: PlaneBytes::from_cache(chroma, copy_bytes),
                    bytes_per_row: width as usize,
                    bytes_per_pixel: 2,
                    width,
                    height: height / 2,
                });
                PixelFormat::FOURCC_420F
            }
            PixelLayout::Packed4 { bytes, row_stride } => {
                planes.push(PlaneDescriptor {
                    bytes: PlaneBytes::from_cache(bytes, copy_bytes),
                    bytes_per_row: *row_stride,
                    bytes_per_pixel: PACKED4_BYTES_PER_PIXEL,
                    width,
                    height,
                });
                PixelFormat::FOURCC_BGRA
            }
        };

        PreviewDescriptor {
            format,
            width,
            height,
            planes,
            metadata,
        }
    }
}
