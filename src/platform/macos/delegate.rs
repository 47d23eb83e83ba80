use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use log::warn;
use objc2::rc::Retained;
use objc2::runtime::{AnyObject, ProtocolObject};
use objc2::{AllocAnyThread, DefinedClass, Message, define_class, msg_send};
use objc2_av_foundation::{
    AVCaptureConnection, AVCaptureOutput, AVCaptureVideoDataOutput,
    AVCaptureVideoDataOutputSampleBufferDelegate,
};
use objc2_core_media::CMSampleBuffer;
use objc2_core_video::kCVPixelBufferPixelFormatTypeKey;
use objc2_foundation::{NSDictionary, NSNumber, NSObjectProtocol, NSString};

use crate::cache::FrameCache;
use crate::error::Error;
use crate::platform::macos::catch_objc;
use crate::platform::macos::frame::{BaseAddressLock, MacosTimestamp};
use crate::types::PixelFormat;

struct DelegateIvars {
    cache: Arc<FrameCache>,
}

// Offers every delivered sample buffer to a shared cache.
define_class!(
    #[unsafe(super(objc2_foundation::NSObject))]
    #[ivars = DelegateIvars]
    #[name = "FrameCacheSampleBufferDelegate"]
    pub struct FrameCacheDelegate;

    unsafe impl NSObjectProtocol for FrameCacheDelegate {}

    unsafe impl AVCaptureVideoDataOutputSampleBufferDelegate for FrameCacheDelegate {
        #[unsafe(method(captureOutput:didOutputSampleBuffer:fromConnection:))]
        #[allow(non_snake_case)]
        unsafe fn captureOutput_didOutputSampleBuffer_fromConnection(
            &self,
            _output: &AVCaptureOutput,
            sample_buffer: &CMSampleBuffer,
            _connection: &AVCaptureConnection,
        ) {
            self.offer(sample_buffer);
        }
    }
);

impl FrameCacheDelegate {
    pub fn new(cache: Arc<FrameCache>) -> Retained<Self> {
        let obj = Self::alloc().set_ivars(DelegateIvars { cache });
        unsafe { msg_send![super(obj), init] }
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.ivars().cache
    }

    fn offer(&self, sample_buffer: &CMSampleBuffer) {
        let Some(pixel_buffer) = (unsafe { sample_buffer.image_buffer() }) else {
            return;
        };

        let cm_time = unsafe { sample_buffer.presentation_time_stamp() };
        let timestamp = MacosTimestamp {
            value: cm_time.value,
            timescale: cm_time.timescale,
            flags: cm_time.flags.0,
            epoch: cm_time.epoch,
        };

        // Held across normalization, released when `lock` drops.
        let Some(lock) = BaseAddressLock::read_only(&pixel_buffer) else {
            warn!("could not lock pixel buffer, frame dropped");
            return;
        };
        self.ivars().cache.accept(&lock.frame(timestamp));
    }
}

/// Keeps a [`FrameCacheDelegate`] installed on a video data output.
/// Dropping it detaches the delegate.
pub struct OutputRegistration {
    output: Retained<AVCaptureVideoDataOutput>,
    delegate: Retained<FrameCacheDelegate>,
}

impl OutputRegistration {
    pub fn delegate(&self) -> &FrameCacheDelegate {
        &self.delegate
    }
}

impl Drop for OutputRegistration {
    fn drop(&mut self) {
        unsafe { self.output.setSampleBufferDelegate_queue(None, None) };
    }
}

/// Feed frames delivered by `output` into `cache` on a serial queue.
pub fn attach_to_output(
    output: &AVCaptureVideoDataOutput,
    cache: Arc<FrameCache>,
) -> Result<OutputRegistration, Error> {
    let delegate = FrameCacheDelegate::new(cache);
    let queue = dispatch2::DispatchQueue::new(
        "camera-frame-cache.capture",
        dispatch2::DispatchQueueAttr::SERIAL,
    );

    catch_objc(AssertUnwindSafe(|| unsafe {
        output.setSampleBufferDelegate_queue(
            Some(ProtocolObject::from_ref(&*delegate)),
            Some(&queue),
        );
    }))?;

    Ok(OutputRegistration {
        output: output.retain(),
        delegate,
    })
}

/// Ask `output` to deliver frames in one of the two cacheable formats
/// instead of its own default (which is typically UYVY).
pub fn request_pixel_format(
    output: &AVCaptureVideoDataOutput,
    pixel_format: PixelFormat,
) -> Result<(), Error> {
    if !(pixel_format.is_biplanar() || pixel_format.is_packed4()) {
        return Err(Error::UnsupportedFormat);
    }
    let fourcc = pixel_format.fourcc();
    catch_objc(AssertUnwindSafe(|| unsafe {
        let key: &NSString = std::mem::transmute::<&objc2_core_foundation::CFString, &NSString>(
            kCVPixelBufferPixelFormatTypeKey,
        );
        let value = NSNumber::new_u32(fourcc);
        let settings: Retained<NSDictionary<NSString, AnyObject>> =
            NSDictionary::dictionaryWithObject_forKey(&value, ProtocolObject::from_ref(key));
        output.setVideoSettings(Some(&settings));
    }))
}
