//! Controller
//!
//! Startup sequencing and task coordination.
//!
//! - `controller_handler`: builds every component from the configuration, then
//!   races the capture pipeline and the listener against the stop signal.
//! - `capture_pipeline`: the sequential packet loop.
//! - `shutdown`: the stop flag shared by both tasks.

pub mod capture_pipeline;
pub mod controller_handler;
pub mod shutdown;

#[cfg(test)]
pub mod integration_tests;

pub use capture_pipeline::{CapturePipeline, PacketOutcome, PipelineStats};
pub use controller_handler::Controller;
pub use shutdown::ShutdownSignal;
