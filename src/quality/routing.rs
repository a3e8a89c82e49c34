//! Quality-based routing: verdicts, rewrite budgets, and escalation.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::QualityConfig;
use crate::host::ContextHandle;

use super::profile::{guidance_for, profile_for};
use super::score::{
    DimensionScore, QualityAssessment, extract_confidence, extract_raw_scores, order_dimensions,
    weakest_failing,
};

/// Next-action verdict for an assessed task output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Polish,
    Rewrite,
    Escalate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Polish => "polish",
            Self::Rewrite => "rewrite",
            Self::Escalate => "escalate",
        }
    }
}

/// Cross-stage remap: (agent type, failing dimension) pairs that route to a
/// different next-stage category than the agent's own default.
///
/// This is a hand-maintained table, not an inferred rule. Agent types added
/// without a remap decision fall back to their own stage; flag those to
/// product owners.
#[derive(Debug, Clone)]
pub struct StageRemap {
    entries: Vec<(String, String, String)>,
}

impl Default for StageRemap {
    fn default() -> Self {
        Self {
            entries: vec![
                ("archivist".to_string(), "coverage".to_string(), "researcher".to_string()),
                ("writer".to_string(), "grounding".to_string(), "researcher".to_string()),
            ],
        }
    }
}

impl StageRemap {
    pub fn insert(
        &mut self,
        agent_type: impl Into<String>,
        dimension: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.entries
            .push((agent_type.into(), dimension.into(), target.into()));
    }

    pub fn target(&self, agent_type: &str, dimension: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, d, _)| {
                a.eq_ignore_ascii_case(agent_type) && d.eq_ignore_ascii_case(dimension)
            })
            .map(|(_, _, t)| t.as_str())
    }
}

/// Directive emitted for one assessed output.
#[derive(Debug, Clone)]
pub struct RoutingDirective {
    pub verdict: Verdict,
    pub agent_type: String,
    /// Category to invoke for the follow-up; absent on pass and escalate.
    pub next_stage: Option<String>,
    /// Execution context to resume for the follow-up.
    pub resume_handle: Option<ContextHandle>,
    /// (attempts used, attempts allowed), present on rewrite and escalate.
    pub attempt: Option<(u32, u32)>,
    /// Full directive text for the coordinating context.
    pub message: String,
}

/// Decides what happens to a task output that carries quality signals.
///
/// Rewrite attempts are budgeted per (coordinating session, agent type) and
/// cleared when the session ends.
pub struct RoutingEngine {
    config: QualityConfig,
    remap: StageRemap,
    rewrite_counts: RwLock<HashMap<(String, String), u32>>,
}

impl RoutingEngine {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            remap: StageRemap::default(),
            rewrite_counts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_remap(mut self, remap: StageRemap) -> Self {
        self.remap = remap;
        self
    }

    /// Extract a quality assessment from free-text output. Falls back from
    /// the scores block to the legacy confidence scalar; yields `None` when
    /// neither parses, and the caller proceeds without a directive.
    pub fn assess(&self, agent_type: &str, output: &str) -> Option<QualityAssessment> {
        let threshold = self.config.pass_threshold_for(agent_type);

        if let Some(raw) = extract_raw_scores(output) {
            let declared = profile_for(agent_type).map(|p| &p.dimensions);
            let dimensions = order_dimensions(raw.dimensions, declared);
            let overall = raw.overall.unwrap_or_else(|| {
                dimensions.iter().map(|d| d.score).sum::<f32>() / dimensions.len() as f32
            });
            let weakest = weakest_failing(&dimensions, threshold);
            let all_pass = weakest.is_none();
            return Some(QualityAssessment {
                agent_type: agent_type.to_string(),
                dimensions,
                overall,
                weakest,
                all_pass,
            });
        }

        let confidence = extract_confidence(output)?;
        let all_pass = confidence >= threshold;
        // Synthesize a pseudo-dimension so the decision table applies
        // uniformly to the legacy signal.
        let weakest = (!all_pass).then(|| DimensionScore {
            name: "confidence".to_string(),
            score: confidence,
        });
        Some(QualityAssessment {
            agent_type: agent_type.to_string(),
            dimensions: Vec::new(),
            overall: confidence,
            weakest,
            all_pass,
        })
    }

    /// Apply the decision table to an assessment and render the directive.
    pub fn route(
        &self,
        session_id: &str,
        assessment: &QualityAssessment,
        resume_handle: Option<&ContextHandle>,
    ) -> RoutingDirective {
        let agent_type = assessment.agent_type.as_str();

        if assessment.all_pass {
            debug!(agent_type, overall = assessment.overall, "Quality pass");
            return RoutingDirective {
                verdict: Verdict::Pass,
                agent_type: agent_type.to_string(),
                next_stage: None,
                resume_handle: None,
                attempt: None,
                message: format!(
                    "All quality dimensions pass for {} ({}). No follow-up needed.",
                    agent_type,
                    render_scores(assessment)
                ),
            };
        }

        let threshold = self.config.pass_threshold_for(agent_type);
        let weakest_score = assessment.weakest.as_ref().map(|w| w.score);
        let needs_rewrite = weakest_score.is_some_and(|s| s < 0.5)
            && assessment.overall < self.config.polish_threshold;

        if !needs_rewrite {
            let directive = self.polish_directive(assessment, resume_handle, threshold);
            debug!(agent_type, verdict = directive.verdict.as_str(), "Quality routed");
            return directive;
        }

        let attempts = self.increment_rewrites(session_id, agent_type);
        let max = self.config.max_rewrite_attempts;
        if attempts > max {
            warn!(
                agent_type,
                session_id,
                attempts,
                max,
                "Rewrite budget exhausted; escalating to human"
            );
            return self.escalate_directive(assessment, attempts, max);
        }

        info!(agent_type, attempts, max, "Rewrite requested");
        self.rewrite_directive(assessment, resume_handle, attempts, max)
    }

    /// Attempts recorded so far for a (session, agent type) pair.
    pub fn rewrite_attempts(&self, session_id: &str, agent_type: &str) -> u32 {
        self.rewrite_counts
            .read()
            .get(&(session_id.to_string(), agent_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Drop all rewrite budgets for a coordinating session.
    pub fn end_session(&self, session_id: &str) {
        self.rewrite_counts
            .write()
            .retain(|(session, _), _| session != session_id);
    }

    fn increment_rewrites(&self, session_id: &str, agent_type: &str) -> u32 {
        let mut counts = self.rewrite_counts.write();
        let count = counts
            .entry((session_id.to_string(), agent_type.to_string()))
            .or_insert(0);
        *count += 1;
        *count
    }

    fn next_stage_for(&self, assessment: &QualityAssessment) -> String {
        assessment
            .weakest
            .as_ref()
            .and_then(|w| self.remap.target(&assessment.agent_type, &w.name))
            .unwrap_or(&assessment.agent_type)
            .to_string()
    }

    fn polish_directive(
        &self,
        assessment: &QualityAssessment,
        resume_handle: Option<&ContextHandle>,
        threshold: f32,
    ) -> RoutingDirective {
        let next_stage = self.next_stage_for(assessment);
        let mut message = format!(
            "Quality check for {}: polish needed. {}\n",
            assessment.agent_type,
            render_scores(assessment)
        );
        message.push_str(&render_weakest(assessment, threshold));
        message.push_str(&render_next_call(&next_stage, resume_handle));

        RoutingDirective {
            verdict: Verdict::Polish,
            agent_type: assessment.agent_type.clone(),
            next_stage: Some(next_stage),
            resume_handle: resume_handle.cloned(),
            attempt: None,
            message,
        }
    }

    fn rewrite_directive(
        &self,
        assessment: &QualityAssessment,
        resume_handle: Option<&ContextHandle>,
        attempts: u32,
        max: u32,
    ) -> RoutingDirective {
        let threshold = self.config.pass_threshold_for(&assessment.agent_type);
        let next_stage = self.next_stage_for(assessment);
        let mut message = format!(
            "Quality check for {}: rewrite required (attempt {}/{}). {}\n",
            assessment.agent_type,
            attempts,
            max,
            render_scores(assessment)
        );
        message.push_str(&render_weakest(assessment, threshold));
        message.push_str(&render_next_call(&next_stage, resume_handle));

        RoutingDirective {
            verdict: Verdict::Rewrite,
            agent_type: assessment.agent_type.clone(),
            next_stage: Some(next_stage),
            resume_handle: resume_handle.cloned(),
            attempt: Some((attempts, max)),
            message,
        }
    }

    fn escalate_directive(
        &self,
        assessment: &QualityAssessment,
        attempts: u32,
        max: u32,
    ) -> RoutingDirective {
        let threshold = self.config.pass_threshold_for(&assessment.agent_type);
        let mut message = format!(
            "Quality check for {}: escalating after {}/{} rewrite attempts. {}\n",
            assessment.agent_type,
            attempts,
            max,
            render_scores(assessment)
        );
        message.push_str(&render_weakest(assessment, threshold));
        message.push_str(
            "Do not launch further automatic rewrites for this task. \
             Request human input on how to proceed.",
        );

        RoutingDirective {
            verdict: Verdict::Escalate,
            agent_type: assessment.agent_type.clone(),
            next_stage: None,
            resume_handle: None,
            attempt: Some((attempts, max)),
            message,
        }
    }
}

fn render_scores(assessment: &QualityAssessment) -> String {
    if assessment.dimensions.is_empty() {
        return format!("Overall: {:.2}.", assessment.overall);
    }
    let dims = assessment
        .dimensions
        .iter()
        .map(|d| format!("{} {:.2}", d.name, d.score))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Scores: {} (overall {:.2}).", dims, assessment.overall)
}

fn render_weakest(assessment: &QualityAssessment, threshold: f32) -> String {
    let Some(weakest) = &assessment.weakest else {
        return String::new();
    };
    let mut out = format!(
        "Weakest dimension: {} at {:.2} (pass is {:.2}).\n",
        weakest.name, weakest.score, threshold
    );
    if let Some(guidance) = guidance_for(&weakest.name) {
        out.push_str(&format!(
            "{}: {}.\n  Good: {}\n  Bad: {}\n  Hints: {} / {}\n",
            guidance.dimension,
            guidance.summary,
            guidance.good_example,
            guidance.bad_example,
            guidance.hints[0],
            guidance.hints[1],
        ));
    }
    out
}

fn render_next_call(next_stage: &str, resume_handle: Option<&ContextHandle>) -> String {
    match resume_handle {
        Some(handle) => format!(
            "Next call: launch a {} follow-up, resuming session {}.",
            next_stage, handle
        ),
        None => format!("Next call: launch a {} follow-up.", next_stage),
    }
}
