use serde::Serialize;

/// Pixel formats a capture pipeline may deliver.
///
/// Only the biplanar 4:2:0 variants and [`PixelFormat::Bgra32`] can be
/// cached; the others are recognized so they can be rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Biplanar luma/chroma 4:2:0, video range (`'420v'`).
    Nv12VideoRange,
    /// Biplanar luma/chroma 4:2:0, full range (`'420f'`).
    Nv12FullRange,
    Yuyv,
    Uyvy,
    /// Packed 4-channel, component 0 = blue (`'BGRA'`).
    Bgra32,
    Jpeg,
}

impl PixelFormat {
    pub const FOURCC_420V: u32 = 0x34_32_30_76;
    pub const FOURCC_420F: u32 = 0x34_32_30_66;
    pub const FOURCC_BGRA: u32 = 0x42_47_52_41;

    /// Map a `kCVPixelFormatType` four-character code.
    pub fn from_fourcc(fourcc: u32) -> Option<Self> {
        #[allow(clippy::mistyped_literal_suffixes)]
        match fourcc {
            Self::FOURCC_420V => Some(PixelFormat::Nv12VideoRange),
            Self::FOURCC_420F => Some(PixelFormat::Nv12FullRange),
            0x79_75_76_73 => Some(PixelFormat::Yuyv), // 'yuvs'
            0x32_76_75_79 => Some(PixelFormat::Uyvy), // '2vuy'
            Self::FOURCC_BGRA => Some(PixelFormat::Bgra32),
            0x6A_70_65_67 => Some(PixelFormat::Jpeg), // 'jpeg'
            _ => None,
        }
    }

    pub fn fourcc(&self) -> u32 {
        #[allow(clippy::mistyped_literal_suffixes)]
        match self {
            PixelFormat::Nv12VideoRange => Self::FOURCC_420V,
            PixelFormat::Nv12FullRange => Self::FOURCC_420F,
            PixelFormat::Yuyv => 0x79_75_76_73,
            PixelFormat::Uyvy => 0x32_76_75_79,
            PixelFormat::Bgra32 => Self::FOURCC_BGRA,
            PixelFormat::Jpeg => 0x6A_70_65_67,
        }
    }

    pub fn is_biplanar(&self) -> bool {
        matches!(
            self,
            PixelFormat::Nv12VideoRange | PixelFormat::Nv12FullRange
        )
    }

    pub fn is_packed4(&self) -> bool {
        matches!(self, PixelFormat::Bgra32)
    }
}

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }
}

/// Capture settings reported alongside frames.
///
/// Every field is optional: `None` means unknown, not zero. Serialized with
/// the key names the plugin transport expects, always present, `null` when
/// unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CaptureMetadata {
    #[serde(rename = "lensAperture")]
    pub aperture: Option<f64>,
    /// Exposure duration in nanoseconds.
    #[serde(rename = "sensorExposureTime")]
    pub exposure_time_ns: Option<i64>,
    #[serde(rename = "sensorSensitivity")]
    pub iso: Option<f64>,
}
