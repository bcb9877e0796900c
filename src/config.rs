use serde::{Deserialize, Serialize};
use std::{env, fs, io, path::PathBuf};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the ONNX classifier.
    pub model: PathBuf,
    /// Optional class names, one per line.
    pub labels: Option<PathBuf>,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/classifier.onnx"),
            labels: None,
            camera: CameraConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("ALERTCAM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("alertcam.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    if let Ok(data) = fs::read(&path) {
        match serde_json::from_slice(&data) {
            Ok(cfg) => return cfg,
            Err(e) => error!("failed to parse {}: {e}", path.display()),
        }
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
    }
    Config::default()
}

pub fn save_config(cfg: &Config) -> io::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    fs::write(&path, data)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}
