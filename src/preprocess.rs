use crate::error::InferError;
use crate::frame::Frame;
use image::imageops::{self, FilterType};

pub const INPUT_SIZE: u32 = 64;
pub const CHANNELS: usize = 3;
/// Shape of the tensor the classifier expects, NHWC.
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, CHANNELS];
pub const INPUT_LEN: usize = INPUT_SIZE as usize * INPUT_SIZE as usize * CHANNELS;

#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl InputTensor {
    pub fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, InferError> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(InferError::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes in native byte order, four per element.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 * self.data.len());
        for v in &self.data {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        bytes
    }
}

/// Squashes the frame to 64x64 (no crop) and emits normalized RGB triplets
/// row by row.
pub fn preprocess(frame: &Frame) -> InputTensor {
    let rgb = frame.image().to_rgb8();
    let resized = if rgb.dimensions() == (INPUT_SIZE, INPUT_SIZE) {
        rgb
    } else {
        imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
    };

    let mut data = Vec::with_capacity(INPUT_LEN);
    for y in 0..INPUT_SIZE {
        for x in 0..INPUT_SIZE {
            let [r, g, b] = resized.get_pixel(x, y).0;
            data.push(r as f32 / 255.0);
            data.push(g as f32 / 255.0);
            data.push(b as f32 / 255.0);
        }
    }

    InputTensor {
        shape: INPUT_SHAPE.to_vec(),
        data,
    }
}
