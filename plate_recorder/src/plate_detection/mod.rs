pub mod candidate_detector;
pub mod ocr;
pub mod plate_format;
pub mod preprocess;
pub mod video_reader;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use opencv::core::Rect;
use opencv::prelude::Mat;

/// A rectangle inside a frame that may hold a plate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub aspect_ratio: f32,
}

impl CandidateRegion {
    pub fn from_rect(rect: Rect) -> Self {
        let aspect_ratio = if rect.height > 0 {
            rect.width as f32 / rect.height as f32
        } else {
            0.0
        };
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            aspect_ratio,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// An accepted and persisted plate reading.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub text: String,
    pub region: CandidateRegion,
    pub crop: Mat,
    pub recognized_at: DateTime<Local>,
    pub image_path: PathBuf,
}
