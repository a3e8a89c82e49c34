//! Task lifecycle orchestration: launch/resume/cancel, lifecycle signals,
//! completion notification, liveness sweep, and staleness reaping.

mod engine;
mod notify;
mod sweep;

pub use engine::TaskOrchestrator;
