//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) yields a
//! working recorder. `Config::load` layers, in order: defaults, the TOML file,
//! `PLATE_RECORDER_*` environment variables, then validates the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_INTERVAL_MS: u64 = 20;
const INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 10..=30;
const DEFAULT_QUEUE_CAPACITY: usize = 10;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_OUTPUT_DIR: &str = "matriculas_detectadas";
const DEFAULT_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const GENERIC_PLATE_PATTERN: &str = "[A-Z0-9]{6,10}";
pub const STRUCTURED_PLATE_PATTERN: &str = "[A-Z]{2,3}[0-9]{3,4}[A-Z]{0,2}";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub queue: QueueConfig,
    pub throttle: ThrottleConfig,
    pub detection: DetectionConfig,
    pub preprocess: PreprocessConfig,
    pub ocr: OcrSettings,
    pub plate: PlateConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera index ("0") or a video file path.
    pub source: String,
    /// Resize every frame to this size when set.
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Restart a video file when it reaches the end.
    pub loop_file: bool,
    /// Producer tick interval.
    pub interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            width: None,
            height: None,
            loop_file: false,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn resize(&self) -> Option<(i32, i32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// How the detector picks regions for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Contour-based candidates filtered by size and aspect ratio.
    #[default]
    Geometric,
    /// No filtering: the whole frame goes to OCR.
    WholeFrame,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub strategy: DetectionStrategy,
    pub median_kernel: i32,
    pub canny_low: f64,
    pub canny_high: f64,
    pub min_width: i32,
    pub min_height: i32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strategy: DetectionStrategy::Geometric,
            median_kernel: 3,
            canny_low: 50.0,
            canny_high: 150.0,
            min_width: 80,
            min_height: 30,
            min_aspect: 2.0,
            max_aspect: 6.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub median_kernel: i32,
    pub gaussian_kernel: i32,
    pub block_size: i32,
    pub offset: f64,
    pub morph_kernel: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            median_kernel: 3,
            gaussian_kernel: 5,
            block_size: 11,
            offset: 2.0,
            morph_kernel: 3,
        }
    }
}

/// Tesseract engine modes (`--oem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngineMode {
    Legacy,
    #[default]
    LstmOnly,
    Combined,
    Default,
}

impl OcrEngineMode {
    pub fn as_raw(self) -> u32 {
        match self {
            OcrEngineMode::Legacy => 0,
            OcrEngineMode::LstmOnly => 1,
            OcrEngineMode::Combined => 2,
            OcrEngineMode::Default => 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    pub tessdata_dir: Option<PathBuf>,
    pub engine_mode: OcrEngineMode,
    /// Tesseract page segmentation mode. 8 reads a single word, 7 a single line.
    pub page_seg_mode: u32,
    pub whitelist: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata_dir: None,
            engine_mode: OcrEngineMode::LstmOnly,
            page_seg_mode: 8,
            whitelist: DEFAULT_WHITELIST.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateFormat {
    /// 6 to 10 alphanumeric characters.
    #[default]
    Generic,
    /// 2-3 letters, 3-4 digits, 0-2 trailing letters.
    Structured,
}

impl PlateFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            PlateFormat::Generic => GENERIC_PLATE_PATTERN,
            PlateFormat::Structured => STRUCTURED_PLATE_PATTERN,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    pub format: PlateFormat,
    /// Custom pattern; takes precedence over `format`.
    pub pattern: Option<String>,
}

impl PlateConfig {
    pub fn pattern(&self) -> &str {
        self.pattern
            .as_deref()
            .unwrap_or_else(|| self.format.pattern())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Config {
    /// Load defaults, then `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("PLATE_RECORDER_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Ok(source) = std::env::var("PLATE_RECORDER_SOURCE") {
            self.capture.source = source;
        }
        if let Ok(pattern) = std::env::var("PLATE_RECORDER_PATTERN") {
            self.plate.pattern = Some(pattern);
        }
        if let Ok(secs) = std::env::var("PLATE_RECORDER_WINDOW_SECS") {
            self.throttle.window_secs = secs.parse().map_err(|_| ConfigError::Invalid {
                key: "PLATE_RECORDER_WINDOW_SECS",
                reason: format!("'{secs}' is not a number of seconds"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be at least 1"));
        }
        if !INTERVAL_RANGE_MS.contains(&self.capture.interval_ms) {
            return Err(invalid(
                "capture.interval_ms",
                "must be between 10 and 30 milliseconds",
            ));
        }
        if self.capture.width.is_some() != self.capture.height.is_some() {
            return Err(invalid(
                "capture.width",
                "width and height must be set together",
            ));
        }
        check_odd("detection.median_kernel", self.detection.median_kernel, 3)?;
        check_odd("preprocess.median_kernel", self.preprocess.median_kernel, 3)?;
        check_odd("preprocess.gaussian_kernel", self.preprocess.gaussian_kernel, 1)?;
        check_odd("preprocess.block_size", self.preprocess.block_size, 3)?;
        if self.preprocess.morph_kernel < 1 {
            return Err(invalid("preprocess.morph_kernel", "must be at least 1"));
        }
        let d = &self.detection;
        if d.min_aspect <= 0.0 || d.min_aspect > d.max_aspect {
            return Err(invalid(
                "detection.min_aspect",
                "must be positive and not above max_aspect",
            ));
        }
        if self.ocr.page_seg_mode > 13 {
            return Err(invalid("ocr.page_seg_mode", "must be between 0 and 13"));
        }
        regex::Regex::new(self.plate.pattern())?;
        Ok(())
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

fn check_odd(key: &'static str, value: i32, min: i32) -> Result<(), ConfigError> {
    if value < min || value % 2 == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("{value} must be odd and at least {min}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recorder_behaviour() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.capacity, 10);
        assert_eq!(cfg.throttle.window(), Duration::from_secs(60));
        assert_eq!(cfg.detection.strategy, DetectionStrategy::Geometric);
        assert_eq!(cfg.plate.pattern(), GENERIC_PLATE_PATTERN);
        assert_eq!(cfg.ocr.engine_mode.as_raw(), 1);
        assert_eq!(cfg.ocr.page_seg_mode, 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [detection]
            strategy = "whole_frame"

            [plate]
            format = "structured"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.detection.strategy, DetectionStrategy::WholeFrame);
        assert_eq!(cfg.detection.min_width, 80);
        assert_eq!(cfg.plate.pattern(), STRUCTURED_PLATE_PATTERN);
        assert_eq!(cfg.queue.capacity, 10);
    }

    #[test]
    fn custom_pattern_wins_over_format() {
        let cfg = Config::from_toml(
            r#"
            [plate]
            format = "structured"
            pattern = "[0-9]{4}[A-Z]{3}"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.plate.pattern(), "[0-9]{4}[A-Z]{3}");
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.queue.capacity = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "queue.capacity", .. })
        ));

        let mut cfg = Config::default();
        cfg.capture.interval_ms = 5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "capture.interval_ms", .. })
        ));
        cfg.capture.interval_ms = 31;
        assert!(cfg.validate().is_err());
        cfg.capture.interval_ms = 30;
        assert!(cfg.validate().is_ok());

        let mut cfg = Config::default();
        cfg.preprocess.block_size = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.plate.pattern = Some("[A-Z".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let err = Config::from_toml("[detection]\nstrategy = \"neural\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
