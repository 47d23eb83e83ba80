//! Rebuilding a displayable bitmap from a cached frame.

use image::RgbaImage;

use crate::cache::StoredFrame;
use crate::error::{Error, Result};
use crate::frame::Plane;
use crate::normalize::{PACKED4_BYTES_PER_PIXEL, PixelLayout};
use crate::types::Size;

/// 8-bit RGBA bitmap. Color values of packed frames stay premultiplied.
pub type Bitmap = RgbaImage;

/// Row alignment of the staging buffer used for biplanar conversion,
/// matching what Core Video hands out for its own pixel buffers.
const STAGING_ROW_ALIGNMENT: usize = 64;

/// Luma/chroma to RGB matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorMatrix {
    #[default]
    Bt601,
    Bt709,
}

impl ColorMatrix {
    /// (Kr, Kb) weights.
    fn weights(self) -> (f32, f32) {
        match self {
            ColorMatrix::Bt601 => (0.299, 0.114),
            ColorMatrix::Bt709 => (0.2126, 0.0722),
        }
    }
}

/// Quantization range of the luma/chroma samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorRange {
    /// Luma and chroma use 0..=255.
    #[default]
    Full,
    /// Luma uses 16..=235, chroma 16..=240.
    Video,
}

/// A biplanar 4:2:0 image with arbitrary row strides.
#[derive(Debug, Clone, Copy)]
pub struct BiplanarImage<'a> {
    pub size: Size,
    pub luma: Plane<'a>,
    /// Interleaved Cb/Cr pairs, `size.height / 2` rows.
    pub chroma: Plane<'a>,
}

/// Converts biplanar luma/chroma images to RGBA.
///
/// The seam where a platform colorimetry engine can replace the software
/// conversion in [`YuvConversion`].
pub trait ColorConverter {
    fn to_rgba(&self, image: &BiplanarImage<'_>) -> Result<Bitmap>;
}

/// Software luma/chroma to RGB conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct YuvConversion {
    pub matrix: ColorMatrix,
    pub range: ColorRange,
}

impl YuvConversion {
    pub fn new(matrix: ColorMatrix, range: ColorRange) -> Self {
        YuvConversion { matrix, range }
    }
}

impl ColorConverter for YuvConversion {
    fn to_rgba(&self, image: &BiplanarImage<'_>) -> Result<Bitmap> {
        let (width, height) = (image.size.width as usize, image.size.height as usize);
        let chroma_rows = height / 2;
        if width < 2 || chroma_rows == 0 {
            return Err(Error::ConversionFailed(format!(
                "{width}x{height} is too small for 4:2:0 chroma"
            )));
        }
        check_plane(&image.luma, width, height, "luma")?;
        check_plane(&image.chroma, width, chroma_rows, "chroma")?;

        let (kr, kb) = self.matrix.weights();
        let kg = 1.0 - kr - kb;
        let cr_to_r = 2.0 * (1.0 - kr);
        let cb_to_b = 2.0 * (1.0 - kb);
        let cb_to_g = 2.0 * kb * (1.0 - kb) / kg;
        let cr_to_g = 2.0 * kr * (1.0 - kr) / kg;
        let (y_offset, y_scale, c_scale) = match self.range {
            ColorRange::Full => (0.0, 1.0, 1.0),
            ColorRange::Video => (16.0, 255.0 / 219.0, 255.0 / 224.0),
        };

        let mut rgba = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            let luma_row = &image.luma.data[y * image.luma.bytes_per_row..][..width];
            let chroma_y = (y / 2).min(chroma_rows - 1);
            let chroma_row = &image.chroma.data[chroma_y * image.chroma.bytes_per_row..][..width];
            for (x, &luma) in luma_row.iter().enumerate() {
                // odd widths reuse the last full pair
                let cx = (x & !1).min(width - 2);
                let cb = (chroma_row[cx] as f32 - 128.0) * c_scale;
                let cr = (chroma_row[cx + 1] as f32 - 128.0) * c_scale;
                let l = (luma as f32 - y_offset) * y_scale;

                rgba.extend_from_slice(&[
                    to_u8(l + cr_to_r * cr),
                    to_u8(l - cb_to_g * cb - cr_to_g * cr),
                    to_u8(l + cb_to_b * cb),
                    u8::MAX,
                ]);
            }
        }

        Bitmap::from_raw(image.size.width, image.size.height, rgba)
            .ok_or_else(|| Error::ConversionFailed("output buffer size mismatch".into()))
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn check_plane(plane: &Plane<'_>, row_len: usize, rows: usize, name: &str) -> Result<()> {
    let needed = plane
        .bytes_per_row
        .saturating_mul(rows - 1)
        .saturating_add(row_len);
    if plane.bytes_per_row < row_len || plane.data.len() < needed {
        return Err(Error::ConversionFailed(format!(
            "{name} plane does not cover {rows} rows of {row_len} bytes"
        )));
    }
    Ok(())
}

/// Freshly allocated biplanar buffer with aligned rows, filled from the
/// tight planes of a cached frame before conversion.
struct StagingBuffer {
    size: Size,
    bytes_per_row: usize,
    luma: Vec<u8>,
    chroma: Vec<u8>,
}

impl StagingBuffer {
    fn allocate(size: Size) -> Result<Self> {
        let (width, height) = (size.width as usize, size.height as usize);
        if width == 0 || height == 0 {
            return Err(Error::ConversionFailed("zero-sized frame".into()));
        }
        let bytes_per_row = width
            .checked_next_multiple_of(STAGING_ROW_ALIGNMENT)
            .ok_or_else(|| Error::ConversionFailed("frame too wide".into()))?;
        Ok(StagingBuffer {
            size,
            bytes_per_row,
            luma: zeroed(bytes_per_row, height)?,
            chroma: zeroed(bytes_per_row, height / 2)?,
        })
    }

    fn fill(&mut self, luma: &[u8], chroma: &[u8]) -> Result<()> {
        let width = self.size.width as usize;
        copy_rows(luma, width, &mut self.luma, self.bytes_per_row)?;
        copy_rows(chroma, width, &mut self.chroma, self.bytes_per_row)
    }

    fn image(&self) -> BiplanarImage<'_> {
        BiplanarImage {
            size: self.size,
            luma: Plane {
                data: &self.luma,
                bytes_per_row: self.bytes_per_row,
            },
            chroma: Plane {
                data: &self.chroma,
                bytes_per_row: self.bytes_per_row,
            },
        }
    }
}

fn zeroed(bytes_per_row: usize, rows: usize) -> Result<Vec<u8>> {
    let len = bytes_per_row
        .checked_mul(rows)
        .ok_or_else(|| Error::ConversionFailed("frame too large".into()))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| Error::ConversionFailed(format!("staging allocation failed: {e}")))?;
    buf.resize(len, 0);
    Ok(buf)
}

fn copy_rows(src: &[u8], row_len: usize, dst: &mut [u8], dst_stride: usize) -> Result<()> {
    let rows = dst.len() / dst_stride;
    if src.len() != row_len * rows {
        return Err(Error::ConversionFailed(
            "cached plane does not match frame size".into(),
        ));
    }
    for (src_row, dst_row) in src.chunks_exact(row_len).zip(dst.chunks_exact_mut(dst_stride)) {
        dst_row[..row_len].copy_from_slice(src_row);
    }
    Ok(())
}

/// Build a bitmap from a cached frame.
///
/// Packed frames are reinterpreted directly (BGRA byte order, i.e. a
/// little-endian premultiplied-alpha-first word). Biplanar frames go through
/// a staging buffer and `converter`.
pub fn reconstruct(frame: &StoredFrame, converter: &dyn ColorConverter) -> Result<Bitmap> {
    let Size { width, height } = frame.size;
    match &frame.layout {
        PixelLayout::Packed4 { bytes, row_stride } => {
            let row_len = width as usize * PACKED4_BYTES_PER_PIXEL;
            if row_len == 0
                || *row_stride < row_len
                || bytes.len() != row_stride * height as usize
            {
                return Err(Error::BitmapConstructionFailed);
            }
            let mut rgba = Vec::with_capacity(row_len * height as usize);
            for row in bytes.chunks_exact(*row_stride) {
                for bgra in row[..row_len].chunks_exact(4) {
                    rgba.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
                }
            }
            Bitmap::from_raw(width, height, rgba).ok_or(Error::BitmapConstructionFailed)
        }
        PixelLayout::Biplanar { luma, chroma } => {
            let mut staging = StagingBuffer::allocate(frame.size)?;
            staging.fill(luma, chroma)?;
            converter.to_rgba(&staging.image())
        }
    }
}
