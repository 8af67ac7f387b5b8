use std::path::PathBuf;

use thiserror::Error;

/// Failures of the image stages (candidate detection and preprocessing).
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image has zero area")]
    EmptyImage,
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine initialisation failed: {0}")]
    Init(String),
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("image has zero area")]
    EmptyImage,
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write image {path}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: Option<opencv::Error>,
    },
    #[error("cannot append to {path}: {source}")]
    LogAppend {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    LogRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source {0} could not be opened")]
    Unavailable(String),
    #[error("frame source is not open")]
    NotOpen,
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid plate pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline startup failed: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("cannot spawn recognition worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recognition worker panicked")]
    WorkerPanicked,
    #[error("pipeline lost its recognizer to a worker panic and cannot restart")]
    Poisoned,
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
