//! Flat-file persistence of accepted plates.
//!
//! Layout of the output directory:
//! - `matricula_<YYYYMMDD_HHMMSS>.jpg`, one per accepted detection
//! - `matriculas_detectadas.txt`, one plate per line in acceptance order

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use opencv::core::Vector;
use opencv::imgcodecs::imwrite;
use opencv::prelude::Mat;

use crate::error::StoreError;

pub const LOG_FILE_NAME: &str = "matriculas_detectadas.txt";
const IMAGE_PREFIX: &str = "matricula_";
const IMAGE_EXTENSION: &str = "jpg";

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Use `dir` as the output directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    /// Write `image` and append `text` to the plate log. Returns the image path.
    pub fn save(
        &self,
        image: &Mat,
        text: &str,
        timestamp: DateTime<Local>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.unique_image_path(&timestamp);

        let written = imwrite(&path.to_string_lossy(), image, &Vector::new()).map_err(|e| {
            StoreError::ImageWrite {
                path: path.clone(),
                source: Some(e),
            }
        })?;
        if !written {
            return Err(StoreError::ImageWrite { path, source: None });
        }

        let log_path = self.log_path();
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .and_then(|mut f| writeln!(f, "{text}"));
        if let Err(source) = appended {
            // Every image must have its log line.
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("cannot remove {}: {e}", path.display());
            }
            return Err(StoreError::LogAppend {
                path: log_path,
                source,
            });
        }

        log::info!("saved plate {text} to {}", path.display());
        Ok(path)
    }

    /// Plates logged so far, oldest first.
    pub fn entries(&self) -> Result<Vec<String>, StoreError> {
        let log_path = self.log_path();
        match std::fs::read_to_string(&log_path) {
            Ok(raw) => Ok(raw
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(source) => Err(StoreError::LogRead {
                path: log_path,
                source,
            }),
        }
    }

    /// Image file names only have second resolution; append a counter on clashes.
    fn unique_image_path(&self, timestamp: &DateTime<Local>) -> PathBuf {
        let stem = format!("{IMAGE_PREFIX}{}", timestamp.format("%Y%m%d_%H%M%S"));
        let mut path = self.dir.join(format!("{stem}.{IMAGE_EXTENSION}"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{n}.{IMAGE_EXTENSION}"));
            n += 1;
        }
        path
    }
}
