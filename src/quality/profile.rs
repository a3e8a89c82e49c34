//! Agent-type quality profiles and the per-dimension improvement catalog.

/// The three scored dimensions declared for an agent type, in evaluation
/// order. Declaration order breaks ties when picking the weakest dimension.
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile {
    pub agent_type: &'static str,
    pub dimensions: [&'static str; 3],
}

/// Known agent types. New entries need a matching remap decision in
/// `StageRemap` when a failing dimension should reroute to another stage.
pub const PROFILES: &[AgentProfile] = &[
    AgentProfile {
        agent_type: "researcher",
        dimensions: ["accuracy", "coverage", "depth"],
    },
    AgentProfile {
        agent_type: "archivist",
        dimensions: ["coverage", "organization", "fidelity"],
    },
    AgentProfile {
        agent_type: "writer",
        dimensions: ["grounding", "clarity", "completeness"],
    },
];

pub fn profile_for(agent_type: &str) -> Option<&'static AgentProfile> {
    PROFILES
        .iter()
        .find(|p| p.agent_type.eq_ignore_ascii_case(agent_type))
}

/// Fixed improvement guidance for one quality dimension.
#[derive(Debug, Clone, Copy)]
pub struct DimensionGuidance {
    pub dimension: &'static str,
    pub summary: &'static str,
    pub good_example: &'static str,
    pub bad_example: &'static str,
    pub hints: [&'static str; 2],
}

const CATALOG: &[DimensionGuidance] = &[
    DimensionGuidance {
        dimension: "accuracy",
        summary: "claims match what the cited material actually says",
        good_example: "\"The module retries 3 times (retry.rs:42 sets MAX_RETRIES=3)\"",
        bad_example: "\"The module retries several times\" with no citation",
        hints: [
            "Quote or cite the exact source for every factual claim",
            "Drop any claim you cannot trace back to a source",
        ],
    },
    DimensionGuidance {
        dimension: "coverage",
        summary: "every relevant source or area was examined, not just the obvious ones",
        good_example: "\"Searched by keyword, by date range, and by author; 12 of 14 archives matched\"",
        bad_example: "\"Found some results in the first archive I checked\"",
        hints: [
            "Enumerate the areas searched and the ones deliberately skipped",
            "Re-run the search with at least one alternate phrasing",
        ],
    },
    DimensionGuidance {
        dimension: "depth",
        summary: "findings are analyzed, not just listed",
        good_example: "\"The two APIs disagree on null handling, which explains the crash\"",
        bad_example: "\"API A returns null. API B throws.\" with no connection drawn",
        hints: [
            "For each finding, state why it matters to the task",
            "Follow at least one finding to its root cause",
        ],
    },
    DimensionGuidance {
        dimension: "organization",
        summary: "material is grouped so a later reader can navigate it",
        good_example: "\"Grouped by subsystem, newest first, duplicates merged\"",
        bad_example: "A flat dump of entries in retrieval order",
        hints: [
            "Group related entries under explicit headings",
            "Merge duplicates and note what was merged",
        ],
    },
    DimensionGuidance {
        dimension: "fidelity",
        summary: "stored content preserves the original meaning without drift",
        good_example: "\"Archived the exact error text plus a one-line paraphrase\"",
        bad_example: "A paraphrase that changes the severity of the original report",
        hints: [
            "Keep a verbatim excerpt next to every paraphrase",
            "Flag anything you summarized aggressively",
        ],
    },
    DimensionGuidance {
        dimension: "grounding",
        summary: "prose is backed by the gathered evidence, not invented",
        good_example: "\"As finding researcher_001 shows, the cache is bypassed on writes\"",
        bad_example: "\"The cache is probably bypassed\" with no supporting finding",
        hints: [
            "Tie every assertion to a prior finding or source id",
            "Move unsupported statements into an open-questions section",
        ],
    },
    DimensionGuidance {
        dimension: "clarity",
        summary: "a reader gets the point without rereading",
        good_example: "One claim per paragraph, defined terms, concrete numbers",
        bad_example: "Nested qualifiers and undefined shorthand",
        hints: [
            "Lead each section with its conclusion",
            "Replace abstract phrasing with the concrete value it stands for",
        ],
    },
    DimensionGuidance {
        dimension: "completeness",
        summary: "the deliverable answers the whole request",
        good_example: "\"All four requested sections present; section 3 marked partial\"",
        bad_example: "Two of four sections delivered without comment",
        hints: [
            "Check the output against each part of the original request",
            "Name anything intentionally left out and why",
        ],
    },
    DimensionGuidance {
        dimension: "confidence",
        summary: "the self-reported confidence reflects the work done",
        good_example: "\"CONFIDENCE: 0.85 - verified against two independent sources\"",
        bad_example: "A high confidence with unverified claims",
        hints: [
            "State what the confidence is based on",
            "Lower the score when any claim is unverified",
        ],
    },
];

pub fn guidance_for(dimension: &str) -> Option<&'static DimensionGuidance> {
    CATALOG
        .iter()
        .find(|g| g.dimension.eq_ignore_ascii_case(dimension))
}
