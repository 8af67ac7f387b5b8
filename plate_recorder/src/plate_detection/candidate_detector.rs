use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Vec4i;
use opencv::core::Vector;

use opencv::imgproc::bounding_rect;
use opencv::imgproc::canny;
use opencv::imgproc::find_contours_with_hierarchy;
use opencv::imgproc::median_blur;
use opencv::imgproc::CHAIN_APPROX_SIMPLE;
use opencv::imgproc::RETR_TREE;

use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use super::preprocess::to_grayscale;
use super::CandidateRegion;
use crate::config::DetectionConfig;
use crate::config::DetectionStrategy;
use crate::error::VisionError;

const CANNY_APERTURE: i32 = 3;

/// Size and shape limits a contour's bounding box must satisfy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateGeometry {
    pub min_width: i32,
    pub min_height: i32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl PlateGeometry {
    pub fn accepts(&self, region: &CandidateRegion) -> bool {
        region.width >= self.min_width
            && region.height >= self.min_height
            && region.aspect_ratio >= self.min_aspect
            && region.aspect_ratio <= self.max_aspect
    }
}

impl Default for PlateGeometry {
    fn default() -> Self {
        let cfg = DetectionConfig::default();
        Self {
            min_width: cfg.min_width,
            min_height: cfg.min_height,
            min_aspect: cfg.min_aspect,
            max_aspect: cfg.max_aspect,
        }
    }
}

pub struct CandidateDetector {
    strategy: DetectionStrategy,
    geometry: PlateGeometry,
    median_kernel: i32,
    canny_low: f64,
    canny_high: f64,
}

impl CandidateDetector {
    pub fn geometric() -> Self {
        Self::from_config(&DetectionConfig::default())
    }

    /// Degraded mode: OCR the whole frame.
    pub fn whole_frame() -> Self {
        Self::from_config(&DetectionConfig {
            strategy: DetectionStrategy::WholeFrame,
            ..DetectionConfig::default()
        })
    }

    pub fn from_config(cfg: &DetectionConfig) -> Self {
        Self {
            strategy: cfg.strategy,
            geometry: PlateGeometry {
                min_width: cfg.min_width,
                min_height: cfg.min_height,
                min_aspect: cfg.min_aspect,
                max_aspect: cfg.max_aspect,
            },
            median_kernel: cfg.median_kernel,
            canny_low: cfg.canny_low,
            canny_high: cfg.canny_high,
        }
    }

    /// Regions of `image` worth sending to OCR. Order is unspecified and
    /// regions may overlap.
    pub fn detect(&self, image: &Mat) -> Result<Vec<CandidateRegion>, VisionError> {
        if image.empty() || image.rows() == 0 || image.cols() == 0 {
            return Ok(vec![]);
        }

        match self.strategy {
            DetectionStrategy::WholeFrame => Ok(vec![CandidateRegion::from_rect(Rect::new(
                0,
                0,
                image.cols(),
                image.rows(),
            ))]),
            DetectionStrategy::Geometric => self.detect_contours(image),
        }
    }

    fn detect_contours(&self, image: &Mat) -> Result<Vec<CandidateRegion>, VisionError> {
        let grey = to_grayscale(image)?;

        let mut denoised = Mat::default();
        median_blur(&grey, &mut denoised, self.median_kernel)?;

        let mut edges = Mat::default();
        canny(
            &denoised,
            &mut edges,
            self.canny_low,
            self.canny_high,
            CANNY_APERTURE,
            false,
        )?;

        let mut contours = Vector::<Vector<Point>>::new();
        let mut hierarchy = Vector::<Vec4i>::new();
        find_contours_with_hierarchy(
            &edges,
            &mut contours,
            &mut hierarchy,
            RETR_TREE,
            CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut out = vec![];
        for contour in contours.iter() {
            let region = CandidateRegion::from_rect(bounding_rect(&contour)?);
            if self.geometry.accepts(&region) {
                out.push(region);
            }
        }

        log::trace!(
            "{} contours, {} plate candidates",
            contours.len(),
            out.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Scalar;
    use opencv::core::CV_8UC3;
    use opencv::imgproc::rectangle;
    use opencv::imgproc::LINE_8;

    fn blank(rows: i32, cols: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn fill(image: &mut Mat, rect: Rect) {
        rectangle(image, rect, Scalar::all(255.0), -1, LINE_8, 0).unwrap();
    }

    #[test]
    fn geometry_bounds_are_inclusive() {
        let geometry = PlateGeometry::default();
        assert!(geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 80, 40))));
        assert!(geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 180, 30))));
        assert!(geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 120, 60))));
        assert!(!geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 79, 30))));
        assert!(!geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 200, 29))));
        assert!(!geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 100, 100))));
        assert!(!geometry.accepts(&CandidateRegion::from_rect(Rect::new(0, 0, 310, 50))));
    }

    #[test]
    fn finds_plate_shaped_rectangle() {
        let mut image = blank(480, 640);
        fill(&mut image, Rect::new(200, 200, 120, 40));

        let regions = CandidateDetector::geometric().detect(&image).unwrap();
        assert!(!regions.is_empty());
        assert!(regions
            .iter()
            .any(|r| (r.x - 200).abs() <= 2 && (r.y - 200).abs() <= 2));
    }

    #[test]
    fn every_candidate_satisfies_geometry() {
        let mut image = blank(480, 640);
        // square, too thin, too small and one plausible plate
        fill(&mut image, Rect::new(20, 20, 100, 100));
        fill(&mut image, Rect::new(20, 200, 400, 20));
        fill(&mut image, Rect::new(500, 30, 40, 15));
        fill(&mut image, Rect::new(300, 350, 150, 50));

        let regions = CandidateDetector::geometric().detect(&image).unwrap();
        assert!(!regions.is_empty());
        for region in regions {
            assert!(region.width >= 80, "{region:?}");
            assert!(region.height >= 30, "{region:?}");
            assert!(region.aspect_ratio >= 2.0 && region.aspect_ratio <= 6.0, "{region:?}");
        }
    }

    #[test]
    fn empty_scene_has_no_candidates() {
        let image = blank(240, 320);
        assert!(CandidateDetector::geometric().detect(&image).unwrap().is_empty());
        assert!(CandidateDetector::geometric()
            .detect(&Mat::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn whole_frame_mode_skips_filtering() {
        let image = blank(240, 320);
        let regions = CandidateDetector::whole_frame().detect(&image).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect(), Rect::new(0, 0, 320, 240));
    }
}
