use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Long-lived `multipart/x-mixed-replace` stream.
    Mjpeg,
    /// One GET per frame against the camera's single-frame endpoint.
    Polling,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_url")]
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: CaptureMode,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Flip frames horizontally before saving, like a mirror.
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub min_confidence: f32,
    #[serde(default = "default_required_items")]
    pub required: Vec<RequiredItem>,
}

/// A detector class that must be present in every frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequiredItem {
    pub class_name: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: default_capture_url(),
            mode: default_mode(),
            quality: default_quality(),
            fps: default_fps(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            mirror: default_mirror(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            required: default_required_items(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

impl CaptureConfig {
    /// The camera URL with quality/fps query parameters for the configured mode.
    ///
    /// Polling mode targets the single-frame endpoint (`/stream` -> `/frame`).
    pub fn source_url(&self) -> String {
        match self.mode {
            CaptureMode::Mjpeg => format!("{}?quality={}&fps={}", self.url, self.quality, self.fps),
            CaptureMode::Polling => self.frame_url(),
        }
    }

    /// URL of the single-frame endpoint, regardless of mode.
    pub fn frame_url(&self) -> String {
        format!(
            "{}?quality={}",
            self.url.replace("/stream", "/frame"),
            self.quality
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_capture_url() -> String {
    "http://127.0.0.1:8000/stream".into()
}
fn default_mode() -> CaptureMode {
    CaptureMode::Mjpeg
}
fn default_quality() -> u32 {
    80
}
fn default_fps() -> f64 {
    10.0
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./")
}
fn default_mirror() -> bool {
    true
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_required_items() -> Vec<RequiredItem> {
    vec![
        RequiredItem {
            class_name: "SafetyVest".into(),
            label: "Safety Vest".into(),
        },
        RequiredItem {
            class_name: "HardHat".into(),
            label: "Hard Hat".into(),
        },
    ]
}
fn default_log_level() -> String {
    "info".into()
}
