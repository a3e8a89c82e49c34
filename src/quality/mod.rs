//! Quality-based routing over self-reported scores in task output.

mod profile;
mod routing;
mod score;

pub use profile::{AgentProfile, DimensionGuidance, PROFILES, guidance_for, profile_for};
pub use routing::{RoutingDirective, RoutingEngine, StageRemap, Verdict};
pub use score::{DimensionScore, QualityAssessment};
