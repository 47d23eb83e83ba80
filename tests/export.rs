use std::fs;
use std::time::Duration;

use camera_frame_cache::{
    CacheConfig, Error, FrameCache, PixelFormat, PixelLayout, Plane, RawFrame, Size,
};
use image::GenericImageView;

fn cache() -> FrameCache {
    let _ = env_logger::builder().is_test(true).try_init();
    FrameCache::new(CacheConfig::default().with_min_interval(Duration::ZERO))
}

/// 4x2 biplanar frame with 4 pad bytes on every native row.
fn padded_nv12() -> (Vec<u8>, Vec<u8>) {
    let luma = vec![10, 20, 30, 40, 0, 0, 0, 0, 50, 60, 70, 80, 0, 0, 0, 0];
    let chroma = vec![1, 2, 3, 4, 0, 0, 0, 0];
    (luma, chroma)
}

#[test]
fn padded_biplanar_frame_exports_as_jpeg() {
    let cache = cache();
    let (luma, chroma) = padded_nv12();
    let frame = RawFrame::biplanar(
        PixelFormat::Nv12VideoRange,
        Size::new(4, 2),
        Plane { data: &luma, bytes_per_row: 8 },
        Plane { data: &chroma, bytes_per_row: 8 },
    );
    assert!(cache.accept(&frame));

    let stored = cache.current_frame().unwrap();
    let PixelLayout::Biplanar { luma, chroma } = &stored.layout else {
        panic!("expected biplanar layout");
    };
    assert_eq!(&luma[..], &[10, 20, 30, 40, 50, 60, 70, 80]);
    assert_eq!(&chroma[..], &[1, 2, 3, 4]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/shots/frame.jpg");
    let written = cache.write_jpeg(&path, 0, 92).unwrap();
    assert_eq!(written, path);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (4, 2));
}

#[test]
fn rotation_swaps_exported_dimensions() {
    let cache = cache();
    let (luma, chroma) = padded_nv12();
    let frame = RawFrame::biplanar(
        PixelFormat::Nv12FullRange,
        Size::new(4, 2),
        Plane { data: &luma, bytes_per_row: 8 },
        Plane { data: &chroma, bytes_per_row: 8 },
    );
    cache.accept(&frame);

    let dir = tempfile::tempdir().unwrap();
    for (degrees, dims) in [(90, (2, 4)), (180, (4, 2)), (-90, (2, 4)), (630, (2, 4))] {
        let path = dir.path().join(format!("rot{degrees}.jpg"));
        cache.write_jpeg(&path, degrees, 90).unwrap();
        assert_eq!(image::open(&path).unwrap().dimensions(), dims, "{degrees} degrees");
    }
}

#[test]
fn export_before_any_frame_fails_closed() {
    let cache = cache();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing/frame.jpg");

    let err = cache.write_jpeg(&path, 0, 90).unwrap_err();
    assert!(matches!(err, Error::NoFrame));
    assert_eq!(err.code(), "no_frame");
    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
}

#[test]
fn odd_height_frame_exports_rotated() {
    let cache = cache();
    let luma: Vec<u8> = (0..12).map(|i| i * 20).collect();
    let chroma = vec![128u8; 4];
    let frame = RawFrame::biplanar(
        PixelFormat::Nv12FullRange,
        Size::new(4, 3),
        Plane { data: &luma, bytes_per_row: 4 },
        Plane { data: &chroma, bytes_per_row: 4 },
    );
    assert!(cache.accept(&frame));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.jpg");
    cache.write_jpeg(&path, 90, 90).unwrap();
    assert_eq!(image::open(&path).unwrap().dimensions(), (3, 4));
}

#[test]
fn too_narrow_biplanar_frame_keeps_previous_frame() {
    let cache = cache();
    let (luma, chroma) = padded_nv12();
    let good = RawFrame::biplanar(
        PixelFormat::Nv12FullRange,
        Size::new(4, 2),
        Plane { data: &luma, bytes_per_row: 8 },
        Plane { data: &chroma, bytes_per_row: 8 },
    );
    assert!(cache.accept(&good));

    let narrow = RawFrame::biplanar(
        PixelFormat::Nv12FullRange,
        Size::new(1, 2),
        Plane { data: &[1, 2], bytes_per_row: 1 },
        Plane { data: &[128], bytes_per_row: 1 },
    );
    assert!(matches!(cache.try_accept(&narrow, None), Err(Error::InvalidFrame(_))));
    assert_eq!(cache.current_frame().unwrap().size, Size::new(4, 2));

    let dir = tempfile::tempdir().unwrap();
    cache.write_jpeg(dir.path().join("still.jpg"), 0, 80).unwrap();
}

/// Smooth gradient with some texture so quality levels differ in size.
fn gradient_bgra(width: usize, height: usize, stride: usize) -> Vec<u8> {
    let mut data = vec![0u8; stride * height];
    for y in 0..height {
        for x in 0..width {
            let px = &mut data[y * stride + x * 4..][..4];
            px[0] = (x * 255 / width) as u8;
            px[1] = (y * 255 / height) as u8;
            px[2] = ((x * y) % 251) as u8;
            px[3] = 255;
        }
    }
    data
}

#[test]
fn quality_is_clamped_and_sizes_grow_with_quality() {
    let cache = cache();
    let (w, h) = (64, 48);
    let stride = w * 4 + 32;
    let data = gradient_bgra(w, h, stride);
    cache.accept(&RawFrame::bgra(Size::new(w as u32, h as u32), &data, stride));

    let dir = tempfile::tempdir().unwrap();
    let size_at = |quality: i32| {
        let path = dir.path().join(format!("q{quality}.jpg"));
        cache.write_jpeg(&path, 0, quality).unwrap();
        fs::metadata(&path).unwrap().len()
    };

    assert_eq!(size_at(-5), size_at(1));
    assert_eq!(size_at(0), size_at(1));
    assert_eq!(size_at(500), size_at(100));

    let sizes: Vec<u64> = [1, 10, 30, 50, 70, 90, 100].into_iter().map(size_at).collect();
    assert!(
        sizes.windows(2).all(|pair| pair[0] <= pair[1]),
        "sizes not monotonic: {sizes:?}"
    );
}

#[test]
fn packed_round_trip_preserves_pixels() {
    let cache = cache();
    let (w, h) = (5usize, 3usize);
    let stride = w * 4 + 12;
    let data = gradient_bgra(w, h, stride);
    cache.accept(&RawFrame::bgra(Size::new(w as u32, h as u32), &data, stride));

    let bitmap = cache.snapshot(0).unwrap();
    for (x, y) in [(0, 0), (4, 0), (2, 1), (4, 2)] {
        let src = &data[y * stride + x * 4..][..4];
        let px = bitmap.get_pixel(x as u32, y as u32).0;
        assert_eq!(px, [src[2], src[1], src[0], src[3]], "pixel ({x}, {y})");
    }
}

#[test]
fn biplanar_round_trip_preserves_luma() {
    let cache = cache();
    let (w, h) = (6usize, 4usize);
    let stride = w + 63;
    let mut luma = vec![0xAA; stride * h];
    for y in 0..h {
        for x in 0..w {
            luma[y * stride + x] = (y * 40 + x * 7) as u8;
        }
    }
    let chroma = vec![128u8; stride * h / 2];
    let frame = RawFrame::biplanar(
        PixelFormat::Nv12FullRange,
        Size::new(w as u32, h as u32),
        Plane { data: &luma, bytes_per_row: stride },
        Plane { data: &chroma, bytes_per_row: stride },
    );
    cache.accept(&frame);

    let bitmap = cache.snapshot(0).unwrap();
    for (x, y) in [(0, 0), (5, 0), (3, 2), (5, 3)] {
        let l = luma[y * stride + x];
        assert_eq!(bitmap.get_pixel(x as u32, y as u32).0, [l, l, l, 255]);
    }
}

#[test]
fn failed_export_leaves_cache_usable() {
    let cache = cache();
    let data = gradient_bgra(8, 8, 32);
    cache.accept(&RawFrame::bgra(Size::new(8, 8), &data, 32));

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"not a directory").unwrap();
    let err = cache.write_jpeg(blocker.join("frame.jpg"), 0, 80).unwrap_err();
    assert!(matches!(err, Error::DestinationCreateFailed(_)));

    let ok = dir.path().join("frame.jpg");
    assert_eq!(cache.write_jpeg(&ok, 0, 80).unwrap(), ok);
}
