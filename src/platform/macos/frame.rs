use objc2_core_video::{
    CVPixelBuffer, CVPixelBufferGetBaseAddress, CVPixelBufferGetBaseAddressOfPlane,
    CVPixelBufferGetBytesPerRow, CVPixelBufferGetBytesPerRowOfPlane, CVPixelBufferGetHeight,
    CVPixelBufferGetHeightOfPlane, CVPixelBufferGetPixelFormatType, CVPixelBufferGetPlaneCount,
    CVPixelBufferGetWidth, CVPixelBufferLockBaseAddress, CVPixelBufferLockFlags,
    CVPixelBufferUnlockBaseAddress, kCVReturnSuccess,
};

use crate::frame::{Frame, Plane, Timestamp};
use crate::types::{PixelFormat, Size};

/// A presentation timestamp mirroring Core Media's `CMTime`.
///
/// Preserves the full precision and semantics of the underlying `CMTime`,
/// including flags and epoch. For a quick seconds value, use
/// [`as_secs_f64()`](Timestamp::as_secs_f64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacosTimestamp {
    /// The numerator of the time value (ticks).
    pub value: i64,
    /// Ticks per second.
    pub timescale: i32,
    /// CMTime flags (valid, has been rounded, positive/negative infinity, indefinite).
    pub flags: u32,
    /// Distinguishes separate timelines that may restart from zero.
    pub epoch: i64,
}

impl Timestamp for MacosTimestamp {
    fn as_secs_f64(&self) -> f64 {
        if self.timescale > 0 {
            self.value as f64 / self.timescale as f64
        } else {
            0.0
        }
    }

    fn as_nanos(&self) -> u64 {
        if self.timescale > 0 && self.value > 0 {
            let nanos = i128::from(self.value) * 1_000_000_000 / i128::from(self.timescale);
            u64::try_from(nanos).unwrap_or(u64::MAX)
        } else {
            0
        }
    }
}

/// Read-only base address lock on a `CVPixelBuffer`, released on drop.
pub struct BaseAddressLock<'a> {
    pixel_buffer: &'a CVPixelBuffer,
}

impl<'a> BaseAddressLock<'a> {
    /// `None` if Core Video refused the lock.
    pub fn read_only(pixel_buffer: &'a CVPixelBuffer) -> Option<Self> {
        let status =
            unsafe { CVPixelBufferLockBaseAddress(pixel_buffer, CVPixelBufferLockFlags::ReadOnly) };
        (status == kCVReturnSuccess).then_some(BaseAddressLock { pixel_buffer })
    }

    /// View the locked buffer as a [`Frame`].
    pub fn frame(&self, timestamp: MacosTimestamp) -> MacosFrame<'_> {
        // SAFETY: the base address stays locked for as long as `self` lives.
        unsafe { MacosFrame::from_locked_pixel_buffer(self.pixel_buffer, timestamp) }
    }
}

impl Drop for BaseAddressLock<'_> {
    fn drop(&mut self) {
        unsafe {
            CVPixelBufferUnlockBaseAddress(self.pixel_buffer, CVPixelBufferLockFlags::ReadOnly);
        }
    }
}

/// A video frame backed by a `CVPixelBuffer`.
/// Only valid while the base address is locked.
pub struct MacosFrame<'a> {
    planes: Vec<Plane<'a>>,
    pixel_format: Option<PixelFormat>,
    size: Size,
    timestamp: MacosTimestamp,
}

impl<'a> MacosFrame<'a> {
    /// Create a frame from a locked pixel buffer.
    /// SAFETY: The pixel buffer base address must be locked for the lifetime 'a.
    pub(crate) unsafe fn from_locked_pixel_buffer(
        pixel_buffer: &'a CVPixelBuffer,
        timestamp: MacosTimestamp,
    ) -> Self {
        let width = CVPixelBufferGetWidth(pixel_buffer);
        let height = CVPixelBufferGetHeight(pixel_buffer);
        let fourcc = CVPixelBufferGetPixelFormatType(pixel_buffer);
        let pixel_format = PixelFormat::from_fourcc(fourcc);
        let size = Size {
            width: width as u32,
            height: height as u32,
        };

        let plane_count = CVPixelBufferGetPlaneCount(pixel_buffer);
        let planes = if plane_count == 0 {
            // Non-planar: single plane
            let base = CVPixelBufferGetBaseAddress(pixel_buffer);
            let bytes_per_row = CVPixelBufferGetBytesPerRow(pixel_buffer);
            match plane_len(bytes_per_row, height) {
                Some(len) if !base.is_null() => {
                    let data = unsafe { std::slice::from_raw_parts(base as *const u8, len) };
                    vec![Plane {
                        data,
                        bytes_per_row,
                    }]
                }
                _ => vec![],
            }
        } else {
            (0..plane_count)
                .filter_map(|i| {
                    let base = CVPixelBufferGetBaseAddressOfPlane(pixel_buffer, i);
                    if base.is_null() {
                        return None;
                    }
                    let bytes_per_row = CVPixelBufferGetBytesPerRowOfPlane(pixel_buffer, i);
                    let h = CVPixelBufferGetHeightOfPlane(pixel_buffer, i);
                    let len = plane_len(bytes_per_row, h)?;
                    let data = unsafe { std::slice::from_raw_parts(base as *const u8, len) };
                    Some(Plane {
                        data,
                        bytes_per_row,
                    })
                })
                .collect()
        };

        MacosFrame {
            planes,
            pixel_format,
            size,
            timestamp,
        }
    }
}

/// Byte length of a plane, `None` when it cannot be addressed.
fn plane_len(bytes_per_row: usize, rows: usize) -> Option<usize> {
    bytes_per_row
        .checked_mul(rows)
        .filter(|&len| len <= isize::MAX as usize)
}

impl<'a> Frame for MacosFrame<'a> {
    type Timestamp = MacosTimestamp;

    fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    fn size(&self) -> Size {
        self.size
    }

    fn planes(&self) -> &[Plane<'_>] {
        &self.planes
    }

    fn timestamp(&self) -> MacosTimestamp {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_len_rejects_overflowing_planes() {
        assert_eq!(plane_len(1920, 1080), Some(1920 * 1080));
        assert_eq!(plane_len(0, 10), Some(0));
        assert_eq!(plane_len(usize::MAX, 2), None);
        assert_eq!(plane_len(isize::MAX as usize + 1, 1), None);
    }
}
