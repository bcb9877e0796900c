pub mod analyzer;
pub mod camera;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod model;
pub mod preprocess;

pub use analyzer::{
    feed, Analyzer, AnalyzerStats, LatestSlot, Published, Submission, MAX_CAPTURE_FAILURES,
};
pub use cli::{analyze, classify_images, execute, run_cli, Cli, Commands, ConfigSubcommand};
pub use config::{config_path, load_config, save_config, CameraConfig, Config};
pub use display::{predictions, render_lines, Labels, Prediction};
pub use error::{FrameError, InferError};
pub use frame::{DirectorySource, Frame, FrameSource};
pub use model::{classify, ElementType, ModelBackend, ModelHandle, OnnxBackend, Scores, TensorSpec};
pub use preprocess::{preprocess, InputTensor, INPUT_LEN, INPUT_SHAPE, INPUT_SIZE};
