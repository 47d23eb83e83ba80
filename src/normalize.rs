//! Repacking of native frames into tightly strided buffers.
//!
//! Native buffers are frequently padded to an alignment boundary at the end
//! of each row. Everything downstream of the cache assumes zero padding, so
//! rows are copied one by one into buffers whose stride equals the row width.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frame::{Frame, Plane};
use crate::types::{PixelFormat, Size};

/// Bytes per pixel of the packed layout.
pub const PACKED4_BYTES_PER_PIXEL: usize = 4;

/// Tightly packed pixel data of a cached frame.
///
/// Buffer lengths always match the layout exactly:
/// - `Biplanar`: `luma.len() == width * height`,
///   `chroma.len() == width * (height / 2)` (interleaved Cb/Cr pairs).
/// - `Packed4`: `bytes.len() == row_stride * height`, `row_stride == width * 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelLayout {
    Biplanar { luma: Arc<[u8]>, chroma: Arc<[u8]> },
    Packed4 { bytes: Arc<[u8]>, row_stride: usize },
}

impl PixelLayout {
    /// Total bytes held across planes.
    pub fn byte_len(&self) -> usize {
        match self {
            PixelLayout::Biplanar { luma, chroma } => luma.len() + chroma.len(),
            PixelLayout::Packed4 { bytes, .. } => bytes.len(),
        }
    }
}

/// Convert a native frame into a [`PixelLayout`].
///
/// Never touches the source frame. Fails with [`Error::UnsupportedFormat`]
/// for anything but the biplanar 4:2:0 and BGRA families, and with
/// [`Error::InvalidFrame`] when the planes do not cover the advertised size.
pub fn normalize<F: Frame + ?Sized>(frame: &F) -> Result<PixelLayout> {
    let format = frame.pixel_format().ok_or(Error::UnsupportedFormat)?;
    let Size { width, height } = frame.size();
    if width == 0 || height == 0 {
        return Err(Error::InvalidFrame("zero-sized frame"));
    }
    let (width, height) = (width as usize, height as usize);
    let planes = frame.planes();

    match format {
        PixelFormat::Nv12VideoRange | PixelFormat::Nv12FullRange => {
            let [luma, chroma, ..] = planes else {
                return Err(Error::InvalidFrame("biplanar frame without two planes"));
            };
            // Odd heights truncate; the last luma row then shares chroma.
            let chroma_rows = height / 2;
            if width < 2 || chroma_rows == 0 {
                return Err(Error::InvalidFrame("biplanar frame needs at least 2x2 pixels"));
            }
            let luma = pack_rows(luma, width, height)?;
            let chroma = pack_rows(chroma, width, chroma_rows)?;
            Ok(PixelLayout::Biplanar {
                luma: luma.into(),
                chroma: chroma.into(),
            })
        }
        PixelFormat::Bgra32 => {
            let Some(plane) = planes.first() else {
                return Err(Error::InvalidFrame("packed frame without a plane"));
            };
            let row_stride = width
                .checked_mul(PACKED4_BYTES_PER_PIXEL)
                .ok_or(Error::InvalidFrame("frame too large"))?;
            let bytes = pack_rows(plane, row_stride, height)?;
            Ok(PixelLayout::Packed4 {
                bytes: bytes.into(),
                row_stride,
            })
        }
        PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Jpeg => Err(Error::UnsupportedFormat),
    }
}

/// Copy `rows` rows of `row_len` bytes out of a plane with arbitrary stride.
fn pack_rows(plane: &Plane<'_>, row_len: usize, rows: usize) -> Result<Vec<u8>> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    let stride = plane.bytes_per_row;
    if stride < row_len {
        return Err(Error::InvalidFrame("row stride smaller than row"));
    }
    let needed = stride
        .checked_mul(rows - 1)
        .and_then(|n| n.checked_add(row_len))
        .ok_or(Error::InvalidFrame("frame too large"))?;
    if plane.data.len() < needed {
        return Err(Error::InvalidFrame("plane shorter than its rows"));
    }

    if stride == row_len {
        return Ok(plane.data[..needed].to_vec());
    }

    let mut out = Vec::with_capacity(row_len * rows);
    for row in plane.data.chunks(stride).take(rows) {
        out.extend_from_slice(&row[..row_len]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;

    /// Build a plane of `rows` rows where byte (x, y) = f(x, y), padded to `stride`.
    fn strided(width: usize, rows: usize, stride: usize, f: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut data = vec![0xEE; stride * rows];
        for y in 0..rows {
            for x in 0..width {
                data[y * stride + x] = f(x, y);
            }
        }
        data
    }

    #[test]
    fn biplanar_lengths_are_tight_regardless_of_stride() {
        let (w, h) = (16usize, 10usize);
        for stride in [w, w + 63] {
            let luma = strided(w, h, stride, |x, y| (x + y) as u8);
            let chroma = strided(w, h / 2, stride, |x, y| (x * y) as u8);
            let frame = RawFrame::biplanar(
                PixelFormat::Nv12VideoRange,
                Size::new(w as u32, h as u32),
                Plane { data: &luma, bytes_per_row: stride },
                Plane { data: &chroma, bytes_per_row: stride },
            );
            let PixelLayout::Biplanar { luma: l, chroma: c } = normalize(&frame).unwrap() else {
                panic!("expected biplanar layout");
            };
            assert_eq!(l.len(), w * h);
            assert_eq!(c.len(), w * (h / 2));
            assert_eq!(l[3 * w + 5], 8);
            assert_eq!(c[2 * w + 7], 14);
            assert!(!l.contains(&0xEE));
        }
    }

    #[test]
    fn padded_bgra_rows_are_stripped() {
        let (w, h) = (3usize, 2usize);
        let stride = w * 4 + 4;
        let data = strided(w * 4, h, stride, |x, y| (y * 100 + x) as u8);
        let frame = RawFrame::bgra(Size::new(w as u32, h as u32), &data, stride);

        let PixelLayout::Packed4 { bytes, row_stride } = normalize(&frame).unwrap() else {
            panic!("expected packed layout");
        };
        assert_eq!(row_stride, 12);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[12..16], &[100, 101, 102, 103]);
    }

    #[test]
    fn full_and_video_range_normalize_identically() {
        let luma = [1u8, 2, 3, 4];
        let chroma = [5u8, 6];
        let size = Size::new(2, 2);
        let make = |pf| {
            let frame = RawFrame::biplanar(
                pf,
                size,
                Plane { data: &luma, bytes_per_row: 2 },
                Plane { data: &chroma, bytes_per_row: 2 },
            );
            normalize(&frame).unwrap()
        };
        assert_eq!(make(PixelFormat::Nv12FullRange), make(PixelFormat::Nv12VideoRange));
    }

    #[test]
    fn other_formats_are_rejected() {
        let data = [0u8; 16];
        let yuyv = RawFrame::new(Some(PixelFormat::Yuyv), Size::new(2, 2)).with_plane(Plane {
            data: &data,
            bytes_per_row: 8,
        });
        assert!(matches!(normalize(&yuyv), Err(Error::UnsupportedFormat)));

        let unknown = RawFrame::new(None, Size::new(2, 2));
        assert!(matches!(normalize(&unknown), Err(Error::UnsupportedFormat)));
    }

    #[test]
    fn short_or_missing_planes_are_invalid() {
        let data = [0u8; 10];
        let short = RawFrame::bgra(Size::new(2, 2), &data, 8);
        assert!(matches!(normalize(&short), Err(Error::InvalidFrame(_))));

        let narrow = RawFrame::bgra(Size::new(2, 1), &data, 4);
        assert!(matches!(normalize(&narrow), Err(Error::InvalidFrame(_))));

        let one_plane = RawFrame::new(Some(PixelFormat::Nv12FullRange), Size::new(2, 2))
            .with_plane(Plane { data: &data, bytes_per_row: 2 });
        assert!(matches!(normalize(&one_plane), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn biplanar_frames_below_two_by_two_are_invalid() {
        let data = [0u8; 8];
        for (w, h) in [(1, 2), (1, 4), (4, 1)] {
            let frame = RawFrame::biplanar(
                PixelFormat::Nv12FullRange,
                Size::new(w, h),
                Plane { data: &data, bytes_per_row: 4 },
                Plane { data: &data, bytes_per_row: 4 },
            );
            assert!(
                matches!(normalize(&frame), Err(Error::InvalidFrame(_))),
                "{w}x{h} accepted"
            );
        }
    }

    #[test]
    fn odd_height_truncates_chroma_rows() {
        let (w, h) = (4usize, 3usize);
        let stride = 8;
        let luma = strided(w, h, stride, |x, y| (y * 10 + x) as u8);
        // only the first chroma row belongs to a 3-row frame
        let chroma = strided(w, 2, stride, |x, y| (100 + y * 10 + x) as u8);
        let frame = RawFrame::biplanar(
            PixelFormat::Nv12VideoRange,
            Size::new(w as u32, h as u32),
            Plane { data: &luma, bytes_per_row: stride },
            Plane { data: &chroma, bytes_per_row: stride },
        );
        let PixelLayout::Biplanar { luma: l, chroma: c } = normalize(&frame).unwrap() else {
            panic!("expected biplanar layout");
        };
        assert_eq!(l.len(), 12);
        assert_eq!(&l[8..], &[20, 21, 22, 23]);
        assert_eq!(&c[..], &[100, 101, 102, 103]);
    }

    #[test]
    fn last_row_may_end_without_padding() {
        // stride 6, but the final row stops right after its 4 bytes
        let data = [1u8, 2, 3, 4, 0, 0, 5, 6, 7, 8];
        let frame = RawFrame::bgra(Size::new(1, 2), &data, 6);
        let PixelLayout::Packed4 { bytes, .. } = normalize(&frame).unwrap() else {
            panic!("expected packed layout");
        };
        assert_eq!(&bytes[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
