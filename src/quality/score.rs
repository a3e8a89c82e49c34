//! Best-effort extraction of self-reported quality signals from task output.
//!
//! Task output is free text, not a schema. Extractors return `Option`; any
//! shape mismatch, out-of-range score, or partial block yields `None` and
//! the caller proceeds without a routing directive.

use std::sync::LazyLock;

use regex::Regex;

static DIMENSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[-*]\s*([A-Za-z][A-Za-z /_-]*?)\s*:\s*(-?[0-9]+(?:\.[0-9]+)?)$").unwrap()
});

static OVERALL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^OVERALL:\s*(-?[0-9]+(?:\.[0-9]+)?)$").unwrap());

static CONFIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*CONFIDENCE:\s*(-?[0-9]+(?:\.[0-9]+)?)\*\*").unwrap()
});

/// One scored axis of evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionScore {
    pub name: String,
    pub score: f32,
}

/// Parsed quality signals for one task output, anchored to the weakest
/// failing dimension.
#[derive(Debug, Clone)]
pub struct QualityAssessment {
    pub agent_type: String,
    /// Dimension scores in declared-profile order when a profile is known.
    pub dimensions: Vec<DimensionScore>,
    pub overall: f32,
    /// Lowest-scoring dimension below the pass threshold, if any. Ties go
    /// to the first dimension in declared order.
    pub weakest: Option<DimensionScore>,
    pub all_pass: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RawScores {
    pub dimensions: Vec<(String, f32)>,
    pub overall: Option<f32>,
}

fn in_range(score: f32) -> bool {
    (0.0..=1.0).contains(&score)
}

/// Scan for a `QUALITY SCORES` block with `- Label: 0.XX` lines and an
/// `OVERALL: 0.XX` line. Any out-of-range score invalidates the block.
pub(crate) fn extract_raw_scores(text: &str) -> Option<RawScores> {
    let mut dimensions: Vec<(String, f32)> = Vec::new();
    let mut overall = None;
    let mut in_block = false;

    for line in text.lines() {
        let line = line.trim().trim_matches('*').trim();
        if !in_block {
            if line.to_ascii_uppercase().contains("QUALITY SCORES") {
                in_block = true;
            }
            continue;
        }
        if let Some(caps) = DIMENSION_LINE.captures(line) {
            let score: f32 = caps[2].parse().ok()?;
            if !in_range(score) {
                return None;
            }
            dimensions.push((caps[1].trim().to_string(), score));
        } else if let Some(caps) = OVERALL_LINE.captures(line) {
            let score: f32 = caps[1].parse().ok()?;
            if !in_range(score) {
                return None;
            }
            overall = Some(score);
            break;
        } else if line.is_empty() {
            if !dimensions.is_empty() {
                break;
            }
        } else {
            // Unrelated prose ends the block.
            break;
        }
    }

    if dimensions.is_empty() {
        return None;
    }
    Some(RawScores {
        dimensions,
        overall,
    })
}

/// Legacy single-scalar signal: `**CONFIDENCE: 0.XX**`. The `**` wrapping
/// is part of the protocol; an unwrapped line does not count.
pub(crate) fn extract_confidence(text: &str) -> Option<f32> {
    let caps = CONFIDENCE.captures(text)?;
    let score: f32 = caps[1].parse().ok()?;
    in_range(score).then_some(score)
}

/// Order parsed dimensions by the declared profile order, appending any
/// labels the profile does not know about.
pub(crate) fn order_dimensions(
    raw: Vec<(String, f32)>,
    declared: Option<&[&'static str; 3]>,
) -> Vec<DimensionScore> {
    let Some(declared) = declared else {
        return raw
            .into_iter()
            .map(|(name, score)| DimensionScore { name, score })
            .collect();
    };

    let mut remaining = raw;
    let mut ordered = Vec::with_capacity(remaining.len());
    for name in declared {
        if let Some(pos) = remaining
            .iter()
            .position(|(label, _)| label.eq_ignore_ascii_case(name))
        {
            let (label, score) = remaining.remove(pos);
            ordered.push(DimensionScore { name: label, score });
        }
    }
    for (name, score) in remaining {
        ordered.push(DimensionScore { name, score });
    }
    ordered
}

/// Pick the weakest failing dimension. Iterating in order with a strict
/// `<` comparison keeps the first-declared dimension on ties.
pub(crate) fn weakest_failing(
    dimensions: &[DimensionScore],
    threshold: f32,
) -> Option<DimensionScore> {
    let mut weakest: Option<&DimensionScore> = None;
    for dim in dimensions {
        if dim.score < threshold && weakest.is_none_or(|w| dim.score < w.score) {
            weakest = Some(dim);
        }
    }
    weakest.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_scores_block() {
        let text = "\
Work finished.

QUALITY SCORES
- Accuracy: 0.85
- Coverage: 0.55
- Depth: 0.90
OVERALL: 0.77

Done.";
        let raw = extract_raw_scores(text).unwrap();
        assert_eq!(raw.dimensions.len(), 3);
        assert_eq!(raw.dimensions[1], ("Coverage".to_string(), 0.55));
        assert_eq!(raw.overall, Some(0.77));
    }

    #[test]
    fn test_extract_scores_tolerates_bold_markers() {
        let text = "**QUALITY SCORES**\n- Grounding: 0.62\n- Clarity: 0.88\n- Completeness: 0.91\n**OVERALL: 0.80**";
        let raw = extract_raw_scores(text).unwrap();
        assert_eq!(raw.dimensions.len(), 3);
        assert_eq!(raw.overall, Some(0.80));
    }

    #[test]
    fn test_out_of_range_dimension_invalidates_block() {
        let text = "QUALITY SCORES\n- Accuracy: 1.5\nOVERALL: 0.8";
        assert!(extract_raw_scores(text).is_none());
    }

    #[test]
    fn test_missing_block_yields_none() {
        assert!(extract_raw_scores("no scores here").is_none());
    }

    #[test]
    fn test_confidence_requires_bold_wrapping() {
        assert_eq!(extract_confidence("**CONFIDENCE: 0.85**"), Some(0.85));
        assert_eq!(extract_confidence("CONFIDENCE: 0.85"), None);
    }

    #[test]
    fn test_confidence_out_of_range_yields_none() {
        assert_eq!(extract_confidence("**CONFIDENCE: 1.5**"), None);
        assert_eq!(extract_confidence("**CONFIDENCE: -0.5**"), None);
    }

    #[test]
    fn test_weakest_tie_goes_to_first_declared() {
        let dims = vec![
            DimensionScore {
                name: "accuracy".to_string(),
                score: 0.55,
            },
            DimensionScore {
                name: "coverage".to_string(),
                score: 0.55,
            },
        ];
        let weakest = weakest_failing(&dims, 0.70).unwrap();
        assert_eq!(weakest.name, "accuracy");
    }

    #[test]
    fn test_order_dimensions_follows_profile() {
        let raw = vec![
            ("Depth".to_string(), 0.9),
            ("Accuracy".to_string(), 0.8),
            ("Coverage".to_string(), 0.7),
        ];
        let ordered = order_dimensions(raw, Some(&["accuracy", "coverage", "depth"]));
        let names: Vec<&str> = ordered.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Accuracy", "Coverage", "Depth"]);
    }
}
