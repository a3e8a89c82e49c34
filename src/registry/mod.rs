//! Task records and the in-memory registry.

mod store;
mod task;

pub use store::TaskStore;
pub use task::{
    LaunchSpec, PendingNotification, ResumeSpec, TaskProgress, TaskStatus, TrackedTask,
};
