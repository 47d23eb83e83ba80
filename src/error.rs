use core::fmt;

#[cfg(target_os = "macos")]
use objc2::exception::Exception;
#[cfg(target_os = "macos")]
use objc2::rc::Retained;

/// Platform-specific error details.
///
/// On macOS an Objective-C exception object raised while talking to
/// AVFoundation is preserved. Use [`Display`](fmt::Display) to obtain a
/// human-readable description.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformError {
    Message(String),
    #[cfg(target_os = "macos")]
    ObjCException(Option<Retained<Exception>>),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            #[cfg(target_os = "macos")]
            Self::ObjCException(Some(e)) => write!(f, "{e:?}"),
            #[cfg(target_os = "macos")]
            Self::ObjCException(None) => f.write_str("unknown Objective-C exception"),
        }
    }
}

impl core::error::Error for PlatformError {}

/// Top-level crate error.
///
/// Every variant is local to the call that produced it: the cache keeps its
/// last good frame, so any failed operation can simply be retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Frame arrived before the minimum interval elapsed. Not a real failure.
    #[error("frame throttled")]
    Throttled,
    #[error("unsupported pixel format")]
    UnsupportedFormat,
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
    #[error("no frame has been captured yet")]
    NoFrame,
    #[error("could not construct bitmap from frame bytes")]
    BitmapConstructionFailed,
    #[error("color conversion failed: {0}")]
    ConversionFailed(String),
    #[error("rotation failed")]
    RotationFailed,
    #[error("could not create destination: {0}")]
    DestinationCreateFailed(#[source] std::io::Error),
    #[error("could not finalize JPEG: {0}")]
    EncodeFinalizeFailed(String),
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl Error {
    /// Stable code the plugin transport maps to a caller-visible error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::UnsupportedFormat => "unsupported_format",
            Self::InvalidFrame(_) => "invalid_frame",
            Self::NoFrame => "no_frame",
            Self::BitmapConstructionFailed => "bitmap_construction_failed",
            Self::ConversionFailed(_) => "conversion_failed",
            Self::RotationFailed => "rotation_failed",
            Self::DestinationCreateFailed(_) => "destination_create_failed",
            Self::EncodeFinalizeFailed(_) => "encode_finalize_failed",
            Self::Platform(_) => "platform_error",
        }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
