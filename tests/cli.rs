use alertcam::config::load_config;
use alertcam::{
    analyze, classify_images, execute, Cli, Commands, ConfigSubcommand, DirectorySource,
    ElementType, InferError, InputTensor, Labels, ModelBackend, ModelHandle, TensorSpec,
    INPUT_SHAPE,
};
use clap::Parser;
use image::{Rgb, RgbImage};
use proptest::prelude::*;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

/// Scores each channel by its mean value.
struct MeanBackend {
    spec: TensorSpec,
}

impl MeanBackend {
    fn new() -> Self {
        Self {
            spec: TensorSpec {
                shape: INPUT_SHAPE.to_vec(),
                dtype: ElementType::F32,
            },
        }
    }
}

impl ModelBackend for MeanBackend {
    fn open(&self) -> Result<Box<dyn ModelHandle + '_>, InferError> {
        Ok(Box::new(MeanHandle { spec: &self.spec }))
    }
}

struct MeanHandle<'a> {
    spec: &'a TensorSpec,
}

impl ModelHandle for MeanHandle<'_> {
    fn input_spec(&self) -> &TensorSpec {
        self.spec
    }

    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>, InferError> {
        let mut sums = [0.0f32; 3];
        for px in input.as_slice().chunks(3) {
            for (s, v) in sums.iter_mut().zip(px) {
                *s += v;
            }
        }
        let n = (input.len() / 3) as f32;
        Ok(sums.iter().map(|s| s / n).collect())
    }
}

fn write_png(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(64, 64, Rgb(color)).save(path).unwrap();
}

proptest! {
    #[test]
    fn parse_camera_frames(value in 0u64..100_000) {
        let args = ["alertcam", "camera", "--frames", &value.to_string()];
        let cli = Cli::parse_from(&args);
        match cli.command {
            Commands::Camera { index, frames } => {
                prop_assert!(index.is_none());
                prop_assert_eq!(frames, Some(value));
            }
            _ => prop_assert!(false, "unexpected subcommand"),
        }
    }

    #[test]
    fn parse_replay_dir(path in "[a-zA-Z0-9][a-zA-Z0-9/_\\.-]*") {
        let args = ["alertcam", "replay", "--dir", &path];
        let cli = Cli::parse_from(&args);
        match cli.command {
            Commands::Replay { dir, frames } => {
                prop_assert_eq!(dir, PathBuf::from(path));
                prop_assert!(frames.is_none());
            }
            _ => prop_assert!(false, "unexpected subcommand"),
        }
    }
}

#[test]
fn global_model_flag_follows_subcommand() {
    let cli = Cli::parse_from(["alertcam", "classify", "a.png", "b.png", "--model", "m.onnx"]);
    assert_eq!(cli.model, Some(PathBuf::from("m.onnx")));
    match cli.command {
        Commands::Classify { images } => {
            assert_eq!(images, vec![PathBuf::from("a.png"), PathBuf::from("b.png")])
        }
        _ => panic!("unexpected subcommand"),
    }
}

#[test]
fn classify_requires_an_image() {
    assert!(Cli::try_parse_from(["alertcam", "classify"]).is_err());
}

#[test]
fn parse_config_camera() {
    let cli = Cli::parse_from(["alertcam", "config", "camera", "--index", "2", "--width", "640"]);
    match cli.command {
        Commands::Config {
            action:
                ConfigSubcommand::Camera {
                    index,
                    width,
                    height,
                },
        } => {
            assert_eq!(index, Some(2));
            assert_eq!(width, Some(640));
            assert_eq!(height, None);
        }
        _ => panic!("unexpected subcommand"),
    }
}

#[test]
#[serial]
fn execute_stores_model_and_camera() {
    let dir = tempdir().unwrap();
    std::env::set_var("ALERTCAM_CONFIG", dir.path().join("alertcam.json"));

    execute(Cli::parse_from(["alertcam", "config", "model", "models/crime.onnx"])).unwrap();
    execute(Cli::parse_from(["alertcam", "config", "camera", "--height", "480"])).unwrap();

    let cfg = load_config();
    assert_eq!(cfg.model, PathBuf::from("models/crime.onnx"));
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.camera.width, 1280);
    assert!(cfg.labels.is_none());
}

#[test]
#[serial]
fn classify_with_missing_model_fails() {
    let dir = tempdir().unwrap();
    std::env::set_var("ALERTCAM_CONFIG", dir.path().join("alertcam.json"));
    let model = dir.path().join("missing.onnx");

    let cli = Cli::parse_from([
        "alertcam",
        "--model",
        model.to_str().unwrap(),
        "classify",
        "frame.png",
    ]);
    let err = execute(cli).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InferError>(),
        Some(InferError::ModelMissing(_))
    ));
}

#[test]
#[serial]
fn replay_of_empty_directory_fails() {
    let dir = tempdir().unwrap();
    std::env::set_var("ALERTCAM_CONFIG", dir.path().join("alertcam.json"));
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();

    let cli = Cli::parse_from(["alertcam", "replay", "--dir", frames.to_str().unwrap()]);
    assert!(execute(cli).is_err());
}

#[test]
#[serial]
fn config_write_failure_is_reported() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    std::env::set_var("ALERTCAM_CONFIG", blocker.join("alertcam.json"));

    let err = execute(Cli::parse_from(["alertcam", "config", "model", "m.onnx"])).unwrap_err();
    assert!(err.to_string().starts_with("writing config"));
    assert!(err.downcast_ref::<std::io::Error>().is_some());
}

#[test]
fn classify_images_prints_labeled_scores() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("red.png");
    write_png(&image, [255, 0, 0]);
    let labels_path = dir.path().join("labels.txt");
    std::fs::write(&labels_path, "red\ngreen\nblue\n").unwrap();
    let labels = Labels::load(&labels_path).unwrap();

    let mut out = Vec::new();
    classify_images(&MeanBackend::new(), Some(&labels), &[image.clone()], &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        format!(
            "{}\nPredictions:\nred: 1.00\ngreen: 0.00\nblue: 0.00\n",
            image.display()
        )
    );
}

#[test]
fn classify_images_stops_at_unreadable_image() {
    let dir = tempdir().unwrap();
    let mut out = Vec::new();
    let missing = dir.path().join("missing.png");
    let err = classify_images(&MeanBackend::new(), None, &[missing], &mut out).unwrap_err();
    assert!(err.to_string().starts_with("reading"));
    assert!(out.is_empty());
}

#[test]
fn replay_runs_frames_through_the_analyzer() {
    let dir = tempdir().unwrap();
    write_png(&dir.path().join("0.png"), [255, 0, 0]);
    write_png(&dir.path().join("1.png"), [0, 255, 0]);
    write_png(&dir.path().join("2.png"), [0, 0, 255]);
    let mut source = DirectorySource::new(dir.path());

    let mut out = Vec::new();
    let stats = analyze(
        &mut source,
        MeanBackend::new(),
        None,
        Some(3),
        Duration::from_millis(5),
        &mut out,
    )
    .unwrap();
    assert!(stats.processed >= 1);
    assert_eq!(stats.processed + stats.skipped, 3);
    assert_eq!(stats.failed, 0);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Predictions:\nClass 0: "));
}
