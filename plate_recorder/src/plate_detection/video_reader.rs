use opencv::core::Size;

use opencv::imgproc::resize;
use opencv::imgproc::INTER_LINEAR;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;

use opencv::videoio::CAP_ANY;

use crate::error::SourceError;
use crate::frame::Frame;
use crate::frame::FrameSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraInput {
    Device(i32),
    File(String),
}

impl CameraInput {
    /// A bare integer selects a capture device, anything else is a file.
    pub fn parse(source: &str) -> Self {
        match source.trim().parse::<i32>() {
            Ok(index) => CameraInput::Device(index),
            Err(_) => CameraInput::File(source.to_string()),
        }
    }
}

impl std::fmt::Display for CameraInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraInput::Device(index) => write!(f, "camera {index}"),
            CameraInput::File(path) => write!(f, "file {path}"),
        }
    }
}

/// OpenCV capture device or video file.
pub struct CameraSource {
    input: CameraInput,
    capture: Option<VideoCapture>,
    resize_to: Option<Size>,
    do_loop: bool,
    sequence: u64,
}

impl CameraSource {
    pub fn new(input: CameraInput) -> Self {
        Self {
            input,
            capture: None,
            resize_to: None,
            do_loop: false,
            sequence: 0,
        }
    }

    pub fn with_resize(mut self, width: i32, height: i32) -> Self {
        self.resize_to = Some(Size::new(width, height));
        self
    }

    /// Rewind video files when they run out.
    pub fn with_loop(mut self, do_loop: bool) -> Self {
        self.do_loop = do_loop;
        self
    }

    fn make_capture(&self) -> Result<VideoCapture, SourceError> {
        let capture = match &self.input {
            CameraInput::Device(index) => VideoCapture::new(*index, CAP_ANY)?,
            CameraInput::File(path) => VideoCapture::from_file(path, CAP_ANY)?,
        };
        if !capture.is_opened()? {
            return Err(SourceError::Unavailable(self.input.to_string()));
        }
        Ok(capture)
    }

    fn grab(&mut self) -> Result<Option<Mat>, SourceError> {
        let capture = self.capture.as_mut().ok_or(SourceError::NotOpen)?;
        let mut image = Mat::default();
        let grabbed = capture.read(&mut image)?;
        if grabbed && !image.empty() {
            return Ok(Some(image));
        }

        if self.do_loop && matches!(self.input, CameraInput::File(_)) {
            log::debug!("{} ended, rewinding", self.input);
            let mut capture = self.make_capture()?;
            let grabbed = capture.read(&mut image)?;
            self.capture = Some(capture);
            if grabbed && !image.empty() {
                return Ok(Some(image));
            }
        }
        Ok(None)
    }
}

impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.capture.is_none() {
            self.capture = Some(self.make_capture()?);
            log::info!("opened {}", self.input);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(image) = self.grab()? else {
            return Ok(None);
        };

        let image = match self.resize_to {
            Some(size) => {
                let mut image_resized = Mat::default();
                resize(&image, &mut image_resized, size, 0.0, 0.0, INTER_LINEAR)?;
                image_resized
            }
            None => image,
        };

        self.sequence += 1;
        Ok(Some(Frame::new(image, self.sequence)))
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                log::warn!("releasing {} failed: {e}", self.input);
            }
            log::info!("released {}", self.input);
        }
    }

    fn is_opened(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
