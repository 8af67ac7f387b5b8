pub mod config;
pub mod error;
pub mod frame;
pub mod pacing;
pub mod pipeline;
pub mod plate_detection;
pub mod store;

pub use config::Config;
pub use frame::Frame;
pub use frame::FrameSource;
pub use pipeline::PipelineCoordinator;
pub use store::ResultStore;
