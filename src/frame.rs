use arrayvec::ArrayVec;
use core::time::Duration;

use crate::types::{PixelFormat, Size};

/// Most planes any supported native frame carries.
pub const MAX_PLANES: usize = 2;

/// A single plane of image data.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub bytes_per_row: usize,
}

/// A presentation timestamp.
pub trait Timestamp {
    fn as_secs_f64(&self) -> f64;

    /// Nanoseconds since the timeline origin, saturating at zero.
    fn as_nanos(&self) -> u64 {
        let secs = self.as_secs_f64();
        if secs.is_finite() && secs > 0.0 {
            (secs * 1e9) as u64
        } else {
            0
        }
    }
}

impl Timestamp for Duration {
    fn as_secs_f64(&self) -> f64 {
        Duration::as_secs_f64(self)
    }

    fn as_nanos(&self) -> u64 {
        u64::try_from(Duration::as_nanos(self)).unwrap_or(u64::MAX)
    }
}

/// A borrowed native video frame. Lifetime tied to callback scope (zero-copy).
pub trait Frame {
    type Timestamp: Timestamp;

    /// `None` when the native format code is not one we recognize.
    fn pixel_format(&self) -> Option<PixelFormat>;
    fn size(&self) -> Size;
    /// Planes in native order; rows may be padded beyond the tight stride.
    fn planes(&self) -> &[Plane<'_>];
    fn timestamp(&self) -> Self::Timestamp;
}

/// A frame assembled from caller-owned slices.
///
/// Lets hosts without a platform backend (and tests) hand arbitrary
/// strided buffers to the cache.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pixel_format: Option<PixelFormat>,
    size: Size,
    planes: ArrayVec<Plane<'a>, MAX_PLANES>,
    timestamp: Duration,
}

impl<'a> RawFrame<'a> {
    pub fn new(pixel_format: Option<PixelFormat>, size: Size) -> Self {
        RawFrame {
            pixel_format,
            size,
            planes: ArrayVec::new(),
            timestamp: Duration::ZERO,
        }
    }

    /// Two-plane luma/chroma frame.
    pub fn biplanar(
        pixel_format: PixelFormat,
        size: Size,
        luma: Plane<'a>,
        chroma: Plane<'a>,
    ) -> Self {
        Self::new(Some(pixel_format), size)
            .with_plane(luma)
            .with_plane(chroma)
    }

    /// Single-plane BGRA frame.
    pub fn bgra(size: Size, data: &'a [u8], bytes_per_row: usize) -> Self {
        Self::new(Some(PixelFormat::Bgra32), size).with_plane(Plane {
            data,
            bytes_per_row,
        })
    }

    /// Append a plane. Planes beyond [`MAX_PLANES`] are ignored.
    pub fn with_plane(mut self, plane: Plane<'a>) -> Self {
        let _ = self.planes.try_push(plane);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Frame for RawFrame<'_> {
    type Timestamp = Duration;

    fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    fn size(&self) -> Size {
        self.size
    }

    fn planes(&self) -> &[Plane<'_>] {
        &self.planes
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}
