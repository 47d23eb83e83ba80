use crate::error::{Error, PlatformError};

pub mod delegate;
pub mod frame;

pub use delegate::{FrameCacheDelegate, OutputRegistration, attach_to_output, request_pixel_format};
pub use frame::{BaseAddressLock, MacosFrame, MacosTimestamp};

/// Catch Objective-C exceptions and convert them to our Error type.
fn catch_objc<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> Result<R, Error> {
    objc2::exception::catch(f)
        .map_err(|exception| Error::Platform(PlatformError::ObjCException(exception)))
}
