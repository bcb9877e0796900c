use crate::error::InferError;
use crate::preprocess::{InputTensor, INPUT_SHAPE};
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    Other(i32),
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => write!(f, "f32"),
            ElementType::Other(code) => write!(f, "onnx type {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    pub dtype: ElementType,
}

/// Output scores of one inference call, one per class.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores(Vec<f32>);

impl Scores {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub trait ModelBackend {
    fn open(&self) -> Result<Box<dyn ModelHandle + '_>, InferError>;
}

/// A ready-to-run model instance. Dropping it releases the backend resources.
pub trait ModelHandle {
    fn input_spec(&self) -> &TensorSpec;
    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>, InferError>;
}

pub fn classify<B: ModelBackend + ?Sized>(
    backend: &B,
    tensor: &InputTensor,
) -> Result<Scores, InferError> {
    let mut handle = backend.open()?;
    let spec = handle.input_spec();
    if spec.shape != INPUT_SHAPE {
        return Err(InferError::ShapeMismatch {
            expected: INPUT_SHAPE.to_vec(),
            actual: spec.shape.clone(),
        });
    }
    if spec.dtype != ElementType::F32 {
        return Err(InferError::ElementType(spec.dtype));
    }
    if tensor.shape() != spec.shape.as_slice() {
        return Err(InferError::ShapeMismatch {
            expected: spec.shape.clone(),
            actual: tensor.shape().to_vec(),
        });
    }
    let scores = handle.run(tensor)?;
    trace!(classes = scores.len(), "inference complete");
    Ok(Scores::new(scores))
}

/// Classifier backed by an ONNX graph evaluated with candle.
pub struct OnnxBackend {
    model: onnx::ModelProto,
    input_name: String,
    output_name: String,
    spec: TensorSpec,
    device: Device,
}

impl OnnxBackend {
    pub fn load(path: &Path) -> Result<Self, InferError> {
        if !path.exists() {
            return Err(InferError::ModelMissing(path.to_path_buf()));
        }
        let model = read_file(path).map_err(|e| InferError::CorruptModel(e.to_string()))?;
        debug!(path = %path.display(), "model loaded");
        Self::from_model(model)
    }

    pub fn from_model(model: onnx::ModelProto) -> Result<Self, InferError> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| InferError::CorruptModel("model graph missing".into()))?;
        let input = graph
            .input
            .first()
            .ok_or_else(|| InferError::CorruptModel("model declares no inputs".into()))?;
        let output = graph
            .output
            .first()
            .ok_or_else(|| InferError::CorruptModel("model declares no outputs".into()))?;
        let spec = input_spec(input)?;
        let input_name = input.name.clone();
        let output_name = output.name.clone();
        debug!(input = %input_name, output = %output_name, shape = ?spec.shape, "model graph inspected");
        Ok(Self {
            input_name,
            output_name,
            spec,
            model,
            device: Device::Cpu,
        })
    }

    pub fn input_spec(&self) -> &TensorSpec {
        &self.spec
    }
}

impl ModelBackend for OnnxBackend {
    fn open(&self) -> Result<Box<dyn ModelHandle + '_>, InferError> {
        trace!("model handle acquired");
        Ok(Box::new(OnnxSession { backend: self }))
    }
}

struct OnnxSession<'a> {
    backend: &'a OnnxBackend,
}

impl ModelHandle for OnnxSession<'_> {
    fn input_spec(&self) -> &TensorSpec {
        &self.backend.spec
    }

    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>, InferError> {
        let backend = self.backend;
        let tensor = Tensor::from_slice(input.as_slice(), input.shape().to_vec(), &backend.device)?;
        let mut inputs = HashMap::new();
        inputs.insert(backend.input_name.clone(), tensor);
        let mut outputs = simple_eval(&backend.model, inputs)?;
        let output = outputs
            .remove(&backend.output_name)
            .ok_or_else(|| InferError::Backend("model output missing".into()))?;
        Ok(output.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

impl Drop for OnnxSession<'_> {
    fn drop(&mut self) {
        trace!("model handle released");
    }
}

fn input_spec(input: &onnx::ValueInfoProto) -> Result<TensorSpec, InferError> {
    use onnx::tensor_shape_proto::dimension::Value as Dim;
    use onnx::type_proto::Value;

    let tensor = match input.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(Value::TensorType(t)) => t,
        _ => {
            return Err(InferError::CorruptModel(format!(
                "input {} is not a tensor",
                input.name
            )))
        }
    };
    let dtype = if tensor.elem_type == onnx::tensor_proto::DataType::Float as i32 {
        ElementType::F32
    } else {
        ElementType::Other(tensor.elem_type)
    };
    // Symbolic batch axes resolve to 1; any other unknown axis becomes 0 and
    // fails the shape check later.
    let shape = tensor
        .shape
        .as_ref()
        .map(|s| {
            s.dim
                .iter()
                .enumerate()
                .map(|(axis, d)| match &d.value {
                    Some(Dim::DimValue(v)) if *v > 0 => *v as usize,
                    Some(Dim::DimParam(_)) if axis == 0 => 1,
                    _ => 0,
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(TensorSpec { shape, dtype })
}
