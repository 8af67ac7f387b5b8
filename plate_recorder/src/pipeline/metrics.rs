use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::Registry;
use prometheus::TextEncoder;

/// Per-pipeline counters. Each coordinator owns its own registry.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub frames_enqueued: IntCounter,
    pub frames_dropped: IntCounter,
    pub frame_read_failures: IntCounter,
    pub frames_processed: IntCounter,
    pub frames_throttled: IntCounter,
    pub candidates_examined: IntCounter,
    pub ocr_failures: IntCounter,
    pub frame_failures: IntCounter,
    pub detections_saved: IntCounter,
    pub save_failures: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("plate_recorder".to_string()), None)?;
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            frames_enqueued: counter("frames_enqueued_total", "Frames accepted by the queue")?,
            frames_dropped: counter("frames_dropped_total", "Frames dropped on a full queue")?,
            frame_read_failures: counter(
                "frame_read_failures_total",
                "Reads from the frame source that produced no frame",
            )?,
            frames_processed: counter("frames_processed_total", "Frames taken by the worker")?,
            frames_throttled: counter(
                "frames_throttled_total",
                "Frames skipped inside the detection window",
            )?,
            candidates_examined: counter(
                "candidates_examined_total",
                "Candidate regions sent through OCR",
            )?,
            ocr_failures: counter("ocr_failures_total", "OCR engine errors")?,
            frame_failures: counter(
                "frame_failures_total",
                "Frames whose processing failed or panicked",
            )?,
            detections_saved: counter("detections_saved_total", "Plates persisted")?,
            save_failures: counter("save_failures_total", "Plates that could not be persisted")?,
            registry,
        })
    }

    /// Text exposition format of every counter.
    pub fn render(&self) -> String {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            log::warn!("cannot encode metrics: {e}");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
