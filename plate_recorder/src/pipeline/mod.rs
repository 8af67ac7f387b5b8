pub mod coordinator;
pub mod metrics;
pub mod queue;
pub mod recognizer;
pub mod throttle;

pub use coordinator::PipelineCoordinator;
pub use coordinator::PipelineState;
pub use metrics::PipelineMetrics;
pub use queue::FrameQueue;
pub use queue::QueueItem;
pub use recognizer::FrameOutcome;
pub use recognizer::PlateRecognizer;
pub use throttle::DetectionThrottle;
