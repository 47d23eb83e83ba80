//! Latest-frame cache for camera plugins.
//!
//! A capture callback offers every native frame to a [`FrameCache`], which
//! throttles updates, strips row padding and keeps exactly one frame. The
//! application side reads it back either as a [`PreviewDescriptor`] of raw
//! planes or as a rotated JPEG file via [`FrameCache::write_jpeg`].

pub mod cache;
pub mod error;
pub mod export;
pub mod frame;
pub mod jpeg;
pub mod normalize;
pub mod platform;
pub mod preview;
pub mod reconstruct;
pub mod rotate;
pub mod types;

// Re-exports
pub use cache::*;
pub use error::*;
pub use frame::*;
pub use jpeg::Quality;
pub use normalize::PixelLayout;
pub use preview::*;
pub use reconstruct::{Bitmap, ColorConverter, ColorMatrix, ColorRange, YuvConversion};
pub use types::*;
