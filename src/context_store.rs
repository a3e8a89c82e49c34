//! Shared artifact store for a coordinating session.
//!
//! Routed tasks publish structured findings here so later follow-ups can
//! build on prior results instead of re-deriving them. Entries are owned by
//! the coordinating session and dropped wholesale when it ends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PREVIEW_ITEMS: usize = 3;
const CONTENT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Major,
    Minor,
    Info,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Info => "info",
        }
    }
}

impl Default for IssueSeverity {
    fn default() -> Self {
        Self::Minor
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactIssue {
    pub severity: IssueSeverity,
    pub description: String,
}

/// Structured payload a task may embed in its output under an `ARTIFACTS`
/// block. Every field is optional; absent keys deserialize to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPayload {
    pub sources: Vec<String>,
    pub findings: Vec<String>,
    pub content: Option<String>,
    pub issues: Vec<ArtifactIssue>,
    pub connections: Vec<String>,
}

impl ArtifactPayload {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.findings.is_empty()
            && self.content.is_none()
            && self.issues.is_empty()
            && self.connections.is_empty()
    }
}

/// One stored artifact, append-only once added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Session-sequential id rendered as `{agent_type}_{NNN}`.
    pub id: String,
    pub agent_type: String,
    pub task_description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ArtifactPayload,
}

#[derive(Default)]
struct SessionArtifacts {
    next_seq: usize,
    artifacts: Vec<Artifact>,
}

/// Per-session accumulator of structured task outputs.
#[derive(Default)]
pub struct ContextStore {
    sessions: RwLock<HashMap<String, SessionArtifacts>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact, assigning the next sequential id for the session.
    /// The sequence is shared across agent types so ids stay globally
    /// ordered within the session.
    pub fn add_artifact(
        &self,
        session_id: &str,
        agent_type: &str,
        task_description: &str,
        payload: ArtifactPayload,
    ) -> Artifact {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(session_id.to_string()).or_default();
        let artifact = Artifact {
            id: format!("{}_{:03}", agent_type, session.next_seq),
            agent_type: agent_type.to_string(),
            task_description: task_description.to_string(),
            timestamp: Utc::now(),
            payload,
        };
        session.next_seq += 1;
        session.artifacts.push(artifact.clone());
        debug!(session_id, artifact_id = %artifact.id, "Artifact stored");
        artifact
    }

    pub fn artifacts(&self, session_id: &str) -> Vec<Artifact> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.artifacts.clone())
            .unwrap_or_default()
    }

    pub fn artifact_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .get(session_id)
            .map_or(0, |s| s.artifacts.len())
    }

    /// Render a compact summary for injection into a follow-up prompt, or
    /// `None` when the session has no artifacts. Previews are bounded so
    /// the summary cannot balloon the prompt.
    pub fn build_context_summary(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read();
        let session = sessions.get(session_id)?;
        if session.artifacts.is_empty() {
            return None;
        }

        let mut by_type: Vec<(&str, Vec<&Artifact>)> = Vec::new();
        for artifact in &session.artifacts {
            match by_type.iter_mut().find(|(t, _)| *t == artifact.agent_type) {
                Some((_, group)) => group.push(artifact),
                None => by_type.push((artifact.agent_type.as_str(), vec![artifact])),
            }
        }

        let mut out = String::from("## Prior task context\n");
        for (agent_type, group) in by_type {
            out.push_str(&format!("\n### {}\n", agent_type));
            for artifact in group {
                out.push_str(&render_artifact(artifact));
            }
        }
        Some(out)
    }

    /// Drop everything owned by a coordinating session.
    pub fn end_session(&self, session_id: &str) {
        if self.sessions.write().remove(session_id).is_some() {
            debug!(session_id, "Session artifacts cleared");
        }
    }
}

fn render_artifact(artifact: &Artifact) -> String {
    let mut line = format!("- [{}] {}", artifact.id, artifact.task_description);

    if !artifact.payload.sources.is_empty() {
        line.push_str(&format!(
            "; sources: {}",
            preview_list(&artifact.payload.sources)
        ));
    }
    if !artifact.payload.findings.is_empty() {
        line.push_str(&format!(
            "; findings: {}",
            preview_list(&artifact.payload.findings)
        ));
    }
    if !artifact.payload.issues.is_empty() {
        line.push_str(&format!("; issues: {}", severity_counts(&artifact.payload.issues)));
    }
    if !artifact.payload.connections.is_empty() {
        line.push_str(&format!(
            "; connects to: {}",
            preview_list(&artifact.payload.connections)
        ));
    }
    if let Some(content) = &artifact.payload.content {
        line.push_str(&format!("\n  content: {}", truncate(content, CONTENT_PREVIEW_CHARS)));
    }
    line.push('\n');
    line
}

fn preview_list(items: &[String]) -> String {
    let shown: Vec<&str> = items.iter().take(PREVIEW_ITEMS).map(String::as_str).collect();
    let mut out = shown.join(", ");
    if items.len() > PREVIEW_ITEMS {
        out.push_str(&format!(" (+{} more)", items.len() - PREVIEW_ITEMS));
    }
    out
}

fn severity_counts(issues: &[ArtifactIssue]) -> String {
    let mut counts: Vec<(IssueSeverity, usize)> = Vec::new();
    for severity in [
        IssueSeverity::Critical,
        IssueSeverity::Major,
        IssueSeverity::Minor,
        IssueSeverity::Info,
    ] {
        let count = issues.iter().filter(|i| i.severity == severity).count();
        if count > 0 {
            counts.push((severity, count));
        }
    }
    counts
        .iter()
        .map(|(severity, count)| format!("{} {}", count, severity.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Extract the JSON object following an `ARTIFACTS` marker. Malformed or
/// partial JSON is "no artifact", never an error.
pub fn parse_artifact_block(text: &str) -> Option<ArtifactPayload> {
    let marker = text.find("ARTIFACTS")?;
    let rest = &text[marker..];
    let start = rest.find('{')?;
    let json = balanced_object(&rest[start..])?;
    let payload: ArtifactPayload = serde_json::from_str(json).ok()?;
    (!payload.is_empty()).then_some(payload)
}

/// Slice out one balanced `{…}` object, respecting strings and escapes.
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_span_agent_types() {
        let store = ContextStore::new();
        let a = store.add_artifact("s1", "researcher", "first", ArtifactPayload::default());
        let b = store.add_artifact("s1", "researcher", "second", ArtifactPayload::default());
        let c = store.add_artifact("s1", "writer", "third", ArtifactPayload::default());

        assert_eq!(a.id, "researcher_000");
        assert_eq!(b.id, "researcher_001");
        assert_eq!(c.id, "writer_002");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = ContextStore::new();
        store.add_artifact("s1", "researcher", "a", ArtifactPayload::default());
        let other = store.add_artifact("s2", "researcher", "b", ArtifactPayload::default());

        assert_eq!(other.id, "researcher_000");
        assert_eq!(store.artifact_count("s1"), 1);
        assert_eq!(store.artifact_count("s2"), 1);
    }

    #[test]
    fn test_summary_none_when_empty() {
        let store = ContextStore::new();
        assert!(store.build_context_summary("nothing").is_none());
    }

    #[test]
    fn test_summary_bounds_previews() {
        let store = ContextStore::new();
        let payload = ArtifactPayload {
            sources: (0..5).map(|i| format!("src-{}", i)).collect(),
            findings: vec!["f1".to_string()],
            content: Some("x".repeat(500)),
            issues: vec![
                ArtifactIssue {
                    severity: IssueSeverity::Critical,
                    description: "bad".to_string(),
                },
                ArtifactIssue {
                    severity: IssueSeverity::Minor,
                    description: "meh".to_string(),
                },
            ],
            connections: Vec::new(),
        };
        store.add_artifact("s1", "researcher", "survey the cache layer", payload);

        let summary = store.build_context_summary("s1").unwrap();
        assert!(summary.contains("### researcher"));
        assert!(summary.contains("[researcher_000]"));
        assert!(summary.contains("(+2 more)"));
        assert!(summary.contains("1 critical, 1 minor"));
        // Content preview stays bounded.
        assert!(summary.len() < 500);
    }

    #[test]
    fn test_end_session_clears_artifacts() {
        let store = ContextStore::new();
        store.add_artifact("s1", "researcher", "a", ArtifactPayload::default());
        store.end_session("s1");
        assert_eq!(store.artifact_count("s1"), 0);
        // The sequence restarts with the session.
        let fresh = store.add_artifact("s1", "researcher", "b", ArtifactPayload::default());
        assert_eq!(fresh.id, "researcher_000");
    }

    #[test]
    fn test_parse_artifact_block() {
        let text = r#"Report done.

ARTIFACTS
{"sources": ["a.rs", "b.rs"], "findings": ["cache bypassed on writes"], "issues": [{"severity": "major", "description": "stale reads"}]}

All set."#;
        let payload = parse_artifact_block(text).unwrap();
        assert_eq!(payload.sources.len(), 2);
        assert_eq!(payload.findings.len(), 1);
        assert_eq!(payload.issues[0].severity, IssueSeverity::Major);
    }

    #[test]
    fn test_malformed_artifact_json_is_no_artifact() {
        assert!(parse_artifact_block("ARTIFACTS\n{\"sources\": [").is_none());
        assert!(parse_artifact_block("ARTIFACTS but no json").is_none());
        assert!(parse_artifact_block("no marker at all {\"sources\": []}").is_none());
    }

    #[test]
    fn test_nested_and_escaped_json_parses() {
        let text = r#"ARTIFACTS {"content": "braces {inside} and a \"quote\"", "findings": ["ok"]}"#;
        let payload = parse_artifact_block(text).unwrap();
        assert_eq!(payload.findings, vec!["ok".to_string()]);
        assert!(payload.content.unwrap().contains("{inside}"));
    }
}
