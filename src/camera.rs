use crate::config::CameraConfig;
use crate::error::FrameError;
use crate::frame::{Frame, FrameSource};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use tracing::{debug, warn};

/// Live frames from a local camera.
pub struct CameraSource {
    cam: Camera,
}

impl CameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self, FrameError> {
        let index = CameraIndex::Index(config.index);
        let mut cam = None;
        let sizes = [(config.width, config.height), (1280, 720), (640, 480)];
        'outer: for (w, h) in sizes {
            for fmt in [FrameFormat::RAWRGB, FrameFormat::MJPEG, FrameFormat::YUYV] {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new_from(w, h, fmt, config.fps),
                ));
                match Camera::new(index.clone(), req) {
                    Ok(c) => {
                        cam = Some(c);
                        break 'outer;
                    }
                    Err(e) => debug!(width = w, height = h, format = ?fmt, "camera format rejected: {e}"),
                }
            }
        }
        let mut cam = match cam {
            Some(c) => c,
            None => {
                let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                Camera::new(index, format)?
            }
        };
        cam.open_stream()?;
        debug!(format = ?cam.camera_format(), "camera stream opened");
        Ok(Self { cam })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let buffer = self.cam.frame()?;
        let image = buffer.decode_image::<RgbFormat>()?;
        Frame::from_rgb(image)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            warn!("failed to stop camera stream: {e}");
        }
    }
}
