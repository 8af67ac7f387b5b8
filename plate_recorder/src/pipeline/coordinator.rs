use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::thread::JoinHandle;

use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;

use super::metrics::PipelineMetrics;
use super::queue::FrameQueue;
use super::recognizer::PlateRecognizer;
use crate::config::Config;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::frame::FrameSource;
use crate::plate_detection::ocr::TextExtractor;
use crate::plate_detection::DetectionResult;

const WORKER_NAME: &str = "plate-recognizer";
const DETECTION_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

/// Owns the frame source and the recognition worker.
///
/// The caller thread is the producer: it pulls frames with [`pump`] (or feeds
/// them with [`submit`]) and never waits on recognition. A single worker
/// thread drains the queue. [`stop`] queues a shutdown marker behind any
/// pending frames, so everything accepted before the call is still processed.
///
/// [`pump`]: PipelineCoordinator::pump
/// [`submit`]: PipelineCoordinator::submit
/// [`stop`]: PipelineCoordinator::stop
pub struct PipelineCoordinator<S: FrameSource> {
    source: S,
    state: PipelineState,
    capacity: usize,
    queue: Option<FrameQueue>,
    worker: Option<JoinHandle<PlateRecognizer>>,
    // Parked here while no worker is running.
    recognizer: Option<PlateRecognizer>,
    output_dir: PathBuf,
    metrics: PipelineMetrics,
    detections: Receiver<DetectionResult>,
}

impl<S: FrameSource> PipelineCoordinator<S> {
    /// A `capacity` of 0 is raised to 1.
    pub fn new(source: S, mut recognizer: PlateRecognizer, capacity: usize) -> Self {
        if capacity == 0 {
            log::warn!("queue capacity 0 would drop every frame, using 1");
        }
        let capacity = capacity.max(1);
        let (tx, detections) = bounded(DETECTION_BUFFER);
        recognizer.set_notifier(tx);
        Self {
            source,
            state: PipelineState::Idle,
            capacity,
            queue: None,
            worker: None,
            output_dir: recognizer.store().dir().to_path_buf(),
            metrics: recognizer.metrics().clone(),
            recognizer: Some(recognizer),
            detections,
        }
    }

    pub fn from_config(
        cfg: &Config,
        source: S,
        extractor: TextExtractor,
    ) -> Result<Self, PipelineError> {
        let recognizer = PlateRecognizer::from_config(cfg, extractor)?;
        Ok(Self::new(source, recognizer, cfg.queue.capacity))
    }

    /// Open the source and start the recognition worker.
    ///
    /// On failure nothing is left running and the pipeline stays `Idle`.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRunning);
        }
        let Some(recognizer) = self.recognizer.take() else {
            return Err(PipelineError::Poisoned);
        };

        if let Err(e) = self.source.open() {
            self.recognizer = Some(recognizer);
            log::error!("cannot start pipeline: {e}");
            return Err(PipelineError::SourceUnavailable(e));
        }

        let (queue, rx) = FrameQueue::bounded(self.capacity);
        // The closure owns the recognizer; if spawning fails it is lost with it.
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || recognizer.run(rx));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.source.release();
                return Err(PipelineError::Spawn(e));
            }
        };

        self.queue = Some(queue);
        self.worker = Some(worker);
        self.state = PipelineState::Running;
        log::info!(
            "pipeline running, queue capacity {}, results in {}",
            self.capacity,
            self.output_dir.display()
        );
        Ok(())
    }

    /// Hand a frame to the worker without waiting. Returns false if it was
    /// dropped because the queue is full or the pipeline is not running.
    pub fn submit(&self, frame: Frame) -> bool {
        if self.state != PipelineState::Running {
            return false;
        }
        let Some(queue) = self.queue.as_ref() else {
            return false;
        };

        let sequence = frame.sequence;
        if queue.offer(frame) {
            self.metrics.frames_enqueued.inc();
            true
        } else {
            self.metrics.frames_dropped.inc();
            log::trace!("queue full, dropped frame {sequence}");
            false
        }
    }

    /// Read one frame from the source and submit a copy of it. The frame is
    /// returned so the caller can display it; `None` when the read produced
    /// nothing.
    pub fn pump(&mut self) -> Option<Frame> {
        if self.state != PipelineState::Running {
            return None;
        }
        let frame = match self.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.metrics.frame_read_failures.inc();
                return None;
            }
            Err(e) => {
                self.metrics.frame_read_failures.inc();
                log::warn!("frame read failed: {e}");
                return None;
            }
        };
        self.submit(frame.clone());
        Some(frame)
    }

    /// Drain pending frames, join the worker and release the source.
    /// Calling it again, or before `start`, does nothing.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Running {
            return Ok(());
        }
        self.state = PipelineState::Stopping;
        log::info!("stopping pipeline");

        if let Some(queue) = self.queue.take() {
            if queue.close().is_err() {
                log::warn!("recognition worker exited before shutdown");
            }
        }

        let joined = self.worker.take().map(JoinHandle::join);

        self.source.release();
        self.state = PipelineState::Idle;

        match joined {
            Some(Ok(recognizer)) => {
                self.recognizer = Some(recognizer);
                log::info!("pipeline stopped");
                Ok(())
            }
            Some(Err(_)) | None => {
                log::error!("recognition worker panicked");
                Err(PipelineError::WorkerPanicked)
            }
        }
    }

    /// Directory holding the saved images and the plate log.
    pub fn list_results(&self) -> &Path {
        &self.output_dir
    }

    /// Accepted detections, as they happen. Notifications are dropped if
    /// nobody drains this receiver.
    pub fn detections(&self) -> Receiver<DetectionResult> {
        self.detections.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// The recognizer, available while the pipeline is `Idle`.
    pub fn recognizer(&self) -> Option<&PlateRecognizer> {
        self.recognizer.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> Drop for PipelineCoordinator<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{e}");
        }
    }
}
