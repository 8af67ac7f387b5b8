//! Binarization of a plate crop for OCR.
//!
//! The output only feeds the OCR engine; previews render the untouched frame.

use opencv::core::Point;
use opencv::core::Size;
use opencv::core::BORDER_CONSTANT;
use opencv::core::BORDER_DEFAULT;

use opencv::imgproc::adaptive_threshold;
use opencv::imgproc::cvt_color;
use opencv::imgproc::dilate;
use opencv::imgproc::erode;
use opencv::imgproc::gaussian_blur;
use opencv::imgproc::get_structuring_element;
use opencv::imgproc::median_blur;
use opencv::imgproc::morphology_default_border_value;
use opencv::imgproc::ADAPTIVE_THRESH_GAUSSIAN_C;
use opencv::imgproc::COLOR_BGRA2GRAY;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::MORPH_RECT;
use opencv::imgproc::THRESH_BINARY_INV;

use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::config::PreprocessConfig;
use crate::error::VisionError;

const BINARY_MAX: f64 = 255.0;

/// Single channel copy of `image`, converting from BGR/BGRA when needed.
pub fn to_grayscale(image: &Mat) -> Result<Mat, VisionError> {
    let code = match image.channels() {
        1 => return Ok(image.try_clone()?),
        4 => COLOR_BGRA2GRAY,
        _ => COLOR_BGR2GRAY,
    };
    let mut grey = Mat::default();
    cvt_color(image, &mut grey, code, 0)?;
    Ok(grey)
}

pub struct ImagePreprocessor {
    median_kernel: i32,
    gaussian_kernel: i32,
    block_size: i32,
    offset: f64,
    morph_kernel: i32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn from_config(cfg: &PreprocessConfig) -> Self {
        Self {
            median_kernel: cfg.median_kernel,
            gaussian_kernel: cfg.gaussian_kernel,
            block_size: cfg.block_size,
            offset: cfg.offset,
            morph_kernel: cfg.morph_kernel,
        }
    }

    /// Grey, denoise, smooth, threshold (characters become white) and close
    /// small gaps in the strokes.
    pub fn prepare(&self, region: &Mat) -> Result<Mat, VisionError> {
        if region.empty() || region.rows() == 0 || region.cols() == 0 {
            return Err(VisionError::EmptyImage);
        }

        let grey = to_grayscale(region)?;

        let mut denoised = Mat::default();
        median_blur(&grey, &mut denoised, self.median_kernel)?;

        let mut smoothed = Mat::default();
        gaussian_blur(
            &denoised,
            &mut smoothed,
            Size::new(self.gaussian_kernel, self.gaussian_kernel),
            0.0,
            0.0,
            BORDER_DEFAULT,
        )?;

        let mut binary = Mat::default();
        adaptive_threshold(
            &smoothed,
            &mut binary,
            BINARY_MAX,
            ADAPTIVE_THRESH_GAUSSIAN_C,
            THRESH_BINARY_INV,
            self.block_size,
            self.offset,
        )?;

        let kernel = get_structuring_element(
            MORPH_RECT,
            Size::new(self.morph_kernel, self.morph_kernel),
            Point::new(-1, -1),
        )?;
        let border = morphology_default_border_value()?;

        let mut dilated = Mat::default();
        dilate(
            &binary,
            &mut dilated,
            &kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            border,
        )?;

        let mut closed = Mat::default();
        erode(
            &dilated,
            &mut closed,
            &kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            border,
        )?;

        Ok(closed)
    }
}
