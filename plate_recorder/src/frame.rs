use std::time::Instant;

use opencv::prelude::Mat;

use crate::error::SourceError;

/// One captured image. The pixel matrix is not modified after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Mat,
    pub captured_at: Instant,
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: Mat, sequence: u64) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            sequence,
        }
    }
}

/// A capture device the coordinator pulls frames from.
///
/// `open` is called once by `PipelineCoordinator::start` and `release` once
/// after the recognition worker has joined.
pub trait FrameSource {
    fn open(&mut self) -> Result<(), SourceError>;

    /// `Ok(None)` means this read produced no frame; the caller skips it.
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;

    fn release(&mut self);

    fn is_opened(&self) -> bool;
}
