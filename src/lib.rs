pub mod admission;
pub mod config;
pub mod context_store;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod quality;
pub mod registry;

pub use admission::AdmissionController;
pub use config::{
    AdmissionConfig, LifecycleConfig, NotificationConfig, QualityConfig, TaskPilotConfig,
};
pub use context_store::{
    Artifact, ArtifactIssue, ArtifactPayload, ContextStore, IssueSeverity, parse_artifact_block,
};
pub use error::{Result, TaskPilotError};
pub use host::{ContextActivity, ContextHandle, ExecutionHost};
pub use orchestrator::TaskOrchestrator;
pub use quality::{
    DimensionScore, QualityAssessment, RoutingDirective, RoutingEngine, StageRemap, Verdict,
};
pub use registry::{
    LaunchSpec, PendingNotification, ResumeSpec, TaskProgress, TaskStatus, TaskStore, TrackedTask,
};
