use crate::error::FrameError;
use image::{DynamicImage, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// One camera or file delivered image sample.
///
/// A `Frame` always has at least one pixel; the constructors reject anything
/// else so that preprocessing never has to.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, FrameError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        Ok(Self { image })
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self, FrameError> {
        Self::from_dynamic(DynamicImage::ImageRgb8(image))
    }

    pub fn from_rgba(image: RgbaImage) -> Result<Self, FrameError> {
        Self::from_dynamic(DynamicImage::ImageRgba8(image))
    }

    /// Builds a frame from packed `0xAARRGGBB` pixels in row-major order.
    pub fn from_argb_pixels(width: u32, height: u32, pixels: &[u32]) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        let mut raw = Vec::with_capacity(expected * 4);
        for &px in pixels {
            raw.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8, (px >> 24) as u8]);
        }
        let image = RgbaImage::from_raw(width, height, raw).ok_or(FrameError::BufferSize {
            expected,
            actual: pixels.len(),
        })?;
        Self::from_rgba(image)
    }

    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let image = image::open(path)?;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "frame decoded");
        Self::from_dynamic(image)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Anything that yields frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError>;
}

/// Replays the regular files of a directory in name order, cycling forever.
pub struct DirectorySource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    index: usize,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Self {
        let frames = match std::fs::read_dir(dir) {
            Ok(rd) => {
                let mut paths: Vec<PathBuf> = rd
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect();
                paths.sort();
                paths
            }
            Err(e) => {
                error!("failed to read {}: {e}", dir.display());
                Vec::new()
            }
        };
        debug!(dir = %dir.display(), count = frames.len(), "frame directory listed");
        Self {
            dir: dir.to_path_buf(),
            frames,
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let Some(path) = self.frames.get(self.index) else {
            return Err(FrameError::NoFrames(self.dir.clone()));
        };
        self.index = (self.index + 1) % self.frames.len();
        Frame::open(path)
    }
}
