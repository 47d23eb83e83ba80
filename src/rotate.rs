//! Pixel rotation of reconstructed bitmaps.
//!
//! Rotation always rewrites pixel data; no orientation tag is ever emitted,
//! so consumers never have to interpret one.

use core::f64::consts::PI;

use image::{Rgba, imageops};

use crate::error::{Error, Result};
use crate::reconstruct::Bitmap;

/// Fold any angle into `[0, 360)`.
pub fn normalize_degrees(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

/// Rotate `bitmap` clockwise by `degrees`.
///
/// Right angles are exact transpositions; `0` hands the input back as is.
/// Any other angle is resampled onto a canvas large enough to hold the whole
/// rotated image, transparent outside the source.
pub fn rotate(bitmap: Bitmap, degrees: i32) -> Result<Bitmap> {
    match normalize_degrees(degrees) {
        0 => Ok(bitmap),
        90 => Ok(imageops::rotate90(&bitmap)),
        180 => Ok(imageops::rotate180(&bitmap)),
        270 => Ok(imageops::rotate270(&bitmap)),
        other => rotate_arbitrary(&bitmap, f64::from(other) * PI / 180.0),
    }
}

fn rotate_arbitrary(src: &Bitmap, radians: f64) -> Result<Bitmap> {
    let (w, h) = (f64::from(src.width()), f64::from(src.height()));
    let (sin, cos) = radians.sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).ceil();
    let out_h = (w * sin.abs() + h * cos.abs()).ceil();
    if !(out_w >= 1.0 && out_h >= 1.0 && out_w <= f64::from(u32::MAX) && out_h <= f64::from(u32::MAX))
    {
        return Err(Error::RotationFailed);
    }
    let (out_w, out_h) = (out_w as u32, out_h as u32);
    (out_w as usize)
        .checked_mul(out_h as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or(Error::RotationFailed)?;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (f64::from(out_w) / 2.0, f64::from(out_h) / 2.0);

    // Inverse mapping: sample the source point that lands on each output pixel.
    Ok(Bitmap::from_fn(out_w, out_h, |x, y| {
        let dx = f64::from(x) + 0.5 - ox;
        let dy = f64::from(y) + 0.5 - oy;
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}
