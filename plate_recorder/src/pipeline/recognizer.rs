use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Local;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crossbeam::channel::TrySendError;
use opencv::prelude::MatTraitConst;

use super::metrics::PipelineMetrics;
use super::queue::QueueItem;
use super::throttle::DetectionThrottle;
use crate::config::Config;
use crate::error::PipelineError;
use crate::error::StoreError;
use crate::error::VisionError;
use crate::frame::Frame;
use crate::plate_detection::candidate_detector::CandidateDetector;
use crate::plate_detection::ocr::TextExtractor;
use crate::plate_detection::plate_format::PlateFormatValidator;
use crate::plate_detection::preprocess::ImagePreprocessor;
use crate::plate_detection::DetectionResult;
use crate::store::ResultStore;

#[derive(Debug)]
pub enum FrameOutcome {
    Throttled,
    NoPlate,
    Detected(DetectionResult),
    SaveFailed { text: String, error: StoreError },
}

pub struct PlateRecognizer {
    detector: CandidateDetector,
    preprocessor: ImagePreprocessor,
    extractor: TextExtractor,
    validator: PlateFormatValidator,
    throttle: DetectionThrottle,
    store: ResultStore,
    metrics: PipelineMetrics,
    notify: Option<Sender<DetectionResult>>,
}

impl PlateRecognizer {
    pub fn new(
        detector: CandidateDetector,
        preprocessor: ImagePreprocessor,
        extractor: TextExtractor,
        validator: PlateFormatValidator,
        throttle: DetectionThrottle,
        store: ResultStore,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            detector,
            preprocessor,
            extractor,
            validator,
            throttle,
            store,
            metrics,
            notify: None,
        }
    }

    pub fn from_config(cfg: &Config, extractor: TextExtractor) -> Result<Self, PipelineError> {
        Ok(Self::new(
            CandidateDetector::from_config(&cfg.detection),
            ImagePreprocessor::from_config(&cfg.preprocess),
            extractor,
            PlateFormatValidator::from_config(&cfg.plate)?,
            DetectionThrottle::new(cfg.throttle.window()),
            ResultStore::open(&cfg.output.dir)?,
            PipelineMetrics::new()?,
        ))
    }

    pub fn throttle(&self) -> &DetectionThrottle {
        &self.throttle
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn set_notifier(&mut self, tx: Sender<DetectionResult>) {
        self.notify = Some(tx);
    }

    /// Run the whole chain on `frame` as of `now`. Stops at the first region
    /// whose text passes validation.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        now: Instant,
    ) -> Result<FrameOutcome, VisionError> {
        if !self.throttle.should_attempt(now) {
            self.metrics.frames_throttled.inc();
            return Ok(FrameOutcome::Throttled);
        }

        let regions = self.detector.detect(&frame.image)?;
        for region in regions {
            self.metrics.candidates_examined.inc();

            let crop = frame.image.apply_1(region.rect())?.try_clone()?;
            let binary = match self.preprocessor.prepare(&crop) {
                Ok(binary) => binary,
                Err(VisionError::EmptyImage) => continue,
                Err(e) => return Err(e),
            };

            let text = match self.extractor.try_extract(&binary) {
                Ok(text) => text,
                Err(e) => {
                    self.metrics.ocr_failures.inc();
                    log::warn!("OCR failed on frame {}: {e}", frame.sequence);
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            if !self.validator.is_valid(&text) {
                log::debug!("'{text}' does not match {}", self.validator.pattern());
                continue;
            }

            log::info!("plate {text} read in frame {}", frame.sequence);
            let recognized_at = Local::now();
            return match self.store.save(&frame.image, &text, recognized_at) {
                Ok(image_path) => {
                    self.throttle.record_success(now);
                    self.metrics.detections_saved.inc();
                    log::info!(
                        "next detection possible in {}s",
                        self.throttle.window().as_secs()
                    );
                    let result = DetectionResult {
                        text,
                        region,
                        crop,
                        recognized_at,
                        image_path,
                    };
                    self.publish(&result);
                    Ok(FrameOutcome::Detected(result))
                }
                Err(error) => {
                    self.metrics.save_failures.inc();
                    log::error!("cannot persist plate {text}: {error}");
                    Ok(FrameOutcome::SaveFailed { text, error })
                }
            };
        }

        Ok(FrameOutcome::NoPlate)
    }

    pub fn process_isolated(&mut self, frame: &Frame, now: Instant) -> Option<FrameOutcome> {
        self.metrics.frames_processed.inc();
        match catch_unwind(AssertUnwindSafe(|| self.process_frame(frame, now))) {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                self.metrics.frame_failures.inc();
                log::warn!("frame {} failed: {e}", frame.sequence);
                None
            }
            Err(_) => {
                self.metrics.frame_failures.inc();
                log::error!("frame {} panicked, continuing", frame.sequence);
                None
            }
        }
    }

    /// Worker loop. Returns itself so throttle state outlives the thread.
    pub(crate) fn run(mut self, rx: Receiver<QueueItem>) -> Self {
        log::info!("recognition worker started");
        while let Ok(item) = rx.recv() {
            match item {
                QueueItem::Frame(frame) => {
                    self.process_isolated(&frame, Instant::now());
                }
                QueueItem::Shutdown => break,
            }
        }
        log::info!("recognition worker stopped");
        self
    }

    fn publish(&self, result: &DetectionResult) {
        let Some(tx) = &self.notify else {
            return;
        };
        match tx.try_send(result.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("detection listener is behind, dropping notification")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::plate_detection::ocr::OcrEngine;
    use opencv::core::Point;
    use opencv::core::Rect;
    use opencv::core::Scalar;
    use opencv::core::CV_8UC3;
    use opencv::imgproc::put_text;
    use opencv::imgproc::rectangle;
    use opencv::imgproc::FONT_HERSHEY_SIMPLEX;
    use opencv::imgproc::LINE_8;
    use opencv::prelude::Mat;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Answers every call with the same text and counts calls.
    struct FixedOcr {
        text: Result<String, ()>,
        calls: Arc<AtomicUsize>,
    }

    impl OcrEngine for FixedOcr {
        fn recognize(&mut self, _image: &Mat) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.text
                .clone()
                .map_err(|_| OcrError::Engine("scripted failure".to_string()))
        }
    }

    struct PanickingOcr;

    impl OcrEngine for PanickingOcr {
        fn recognize(&mut self, _image: &Mat) -> Result<String, OcrError> {
            panic!("engine crashed");
        }
    }

    fn plate_frame() -> Frame {
        let mut image =
            Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        rectangle(
            &mut image,
            Rect::new(260, 220, 120, 40),
            Scalar::all(255.0),
            -1,
            LINE_8,
            0,
        )
        .unwrap();
        put_text(
            &mut image,
            "AB1234CD",
            Point::new(272, 246),
            FONT_HERSHEY_SIMPLEX,
            0.5,
            Scalar::all(0.0),
            1,
            LINE_8,
            false,
        )
        .unwrap();
        Frame::new(image, 1)
    }

    fn recognizer(
        engine: Box<dyn OcrEngine>,
        dir: &std::path::Path,
    ) -> PlateRecognizer {
        let mut cfg = Config::default();
        cfg.output.dir = dir.to_path_buf();
        cfg.plate.format = crate::config::PlateFormat::Structured;
        PlateRecognizer::from_config(&cfg, TextExtractor::new(engine)).unwrap()
    }

    fn fixed(text: &str) -> (Box<dyn OcrEngine>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = FixedOcr {
            text: Ok(text.to_string()),
            calls: calls.clone(),
        };
        (Box::new(engine), calls)
    }

    #[test]
    fn throttle_window_suppresses_then_reopens() {
        let tmp = tempdir().unwrap();
        let (engine, _) = fixed("AB1234CD");
        let mut rec = recognizer(engine, tmp.path());
        let frame = plate_frame();
        let t0 = Instant::now();

        let first = rec.process_frame(&frame, t0).unwrap();
        assert!(matches!(first, FrameOutcome::Detected(ref r) if r.text == "AB1234CD"));
        assert_eq!(rec.throttle().last_success(), Some(t0));

        let second = rec
            .process_frame(&frame, t0 + Duration::from_secs(30))
            .unwrap();
        assert!(matches!(second, FrameOutcome::Throttled));
        assert_eq!(rec.throttle().last_success(), Some(t0));

        let t61 = t0 + Duration::from_secs(61);
        let third = rec.process_frame(&frame, t61).unwrap();
        assert!(matches!(third, FrameOutcome::Detected(_)));
        assert_eq!(rec.throttle().last_success(), Some(t61));

        assert_eq!(rec.store().entries().unwrap(), vec!["AB1234CD", "AB1234CD"]);
        assert_eq!(rec.metrics().detections_saved.get(), 2);
        assert_eq!(rec.metrics().frames_throttled.get(), 1);
    }

    #[test]
    fn stops_after_first_valid_region() {
        let tmp = tempdir().unwrap();
        let (engine, calls) = fixed("ab 1234 cd");
        let mut rec = recognizer(engine, tmp.path());

        let outcome = rec.process_frame(&plate_frame(), Instant::now()).unwrap();
        assert!(matches!(outcome, FrameOutcome::Detected(ref r) if r.text == "AB1234CD"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_text_does_not_consume_window() {
        let tmp = tempdir().unwrap();
        let (engine, calls) = fixed("HELLO");
        let mut rec = recognizer(engine, tmp.path());

        let outcome = rec.process_frame(&plate_frame(), Instant::now()).unwrap();
        assert!(matches!(outcome, FrameOutcome::NoPlate));
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(rec.throttle().last_success(), None);
        assert!(rec.store().entries().unwrap().is_empty());
    }

    #[test]
    fn ocr_errors_are_counted_and_absorbed() {
        let tmp = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = FixedOcr {
            text: Err(()),
            calls: calls.clone(),
        };
        let mut rec = recognizer(Box::new(engine), tmp.path());

        let outcome = rec.process_frame(&plate_frame(), Instant::now()).unwrap();
        assert!(matches!(outcome, FrameOutcome::NoPlate));
        assert_eq!(
            rec.metrics().ocr_failures.get() as usize,
            calls.load(Ordering::SeqCst)
        );
        assert_eq!(rec.throttle().last_success(), None);
    }

    #[test]
    fn blank_frame_is_no_plate() {
        let tmp = tempdir().unwrap();
        let (engine, calls) = fixed("AB1234CD");
        let mut rec = recognizer(engine, tmp.path());
        let blank = Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();

        let outcome = rec
            .process_frame(&Frame::new(blank, 1), Instant::now())
            .unwrap();
        assert!(matches!(outcome, FrameOutcome::NoPlate));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn save_failure_is_distinct_and_keeps_window_open() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("out");
        let (engine, _) = fixed("AB1234CD");
        let mut rec = recognizer(engine, &dir);
        std::fs::remove_dir_all(&dir).unwrap();

        let outcome = rec.process_frame(&plate_frame(), Instant::now()).unwrap();
        assert!(matches!(outcome, FrameOutcome::SaveFailed { ref text, .. } if text == "AB1234CD"));
        assert_eq!(rec.throttle().last_success(), None);
        assert_eq!(rec.metrics().save_failures.get(), 1);
    }

    #[test]
    fn panics_are_isolated_per_frame() {
        let tmp = tempdir().unwrap();
        let mut rec = recognizer(Box::new(PanickingOcr), tmp.path());

        assert!(rec.process_isolated(&plate_frame(), Instant::now()).is_none());
        assert!(rec.process_isolated(&plate_frame(), Instant::now()).is_none());
        assert_eq!(rec.metrics().frame_failures.get(), 2);
        assert_eq!(rec.metrics().frames_processed.get(), 2);
    }

    #[test]
    fn whole_frame_mode_reads_entire_image() {
        let tmp = tempdir().unwrap();
        let (engine, calls) = fixed("ABC123");
        let mut cfg = Config::default();
        cfg.output.dir = tmp.path().to_path_buf();
        cfg.detection.strategy = crate::config::DetectionStrategy::WholeFrame;
        let mut rec = PlateRecognizer::from_config(&cfg, TextExtractor::new(engine)).unwrap();

        let outcome = rec.process_frame(&plate_frame(), Instant::now()).unwrap();
        match outcome {
            FrameOutcome::Detected(result) => {
                assert_eq!(result.text, "ABC123");
                assert_eq!(result.region.rect(), Rect::new(0, 0, 640, 480));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
