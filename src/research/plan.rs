//! Research plan types and the deterministic fallback parser.
//!
//! The planning backend may return a structured plan or free text. The
//! ambiguity is resolved once at the plan generator boundary via
//! [`PlanResponse`]; raw text goes through [`fallback_plan`], which is total:
//! for any input it produces a valid plan and never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Upper bound on sub-queries recovered from unstructured planner output.
const MAX_RECOVERED_SUB_QUERIES: usize = 5;

const DEFAULT_SYNTHESIS_INSTRUCTIONS: &str =
    "Synthesize the research findings into a comprehensive, well-structured answer \
     to the original query. Cite sources where available.";

/// Execution strategy chosen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanStrategy {
    /// Single focused sub-query.
    Simple,
    /// A handful of independent sub-queries.
    Standard,
    /// Broad decomposition across many angles.
    Complex,
    /// Planning itself failed; carried so the failure is still recorded as a plan.
    Error,
}

impl PlanStrategy {
    /// Fixed duration estimate for the strategy, in seconds.
    pub fn duration_estimate(&self) -> u64 {
        match self {
            PlanStrategy::Simple => 30,
            PlanStrategy::Standard => 90,
            PlanStrategy::Complex => 180,
            PlanStrategy::Error => 0,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStrategy::Simple => "simple",
            PlanStrategy::Standard => "standard",
            PlanStrategy::Complex => "complex",
            PlanStrategy::Error => "error",
        }
    }
}

/// The decomposition of one query into ordered sub-queries.
///
/// Sub-query order defines thread index assignment and is stable for the
/// life of the plan. Serialized verbatim into the parent execution's
/// metadata under `"plan"` and read back verbatim by synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchPlan {
    /// The original query text.
    pub query: String,
    /// Chosen execution strategy.
    pub strategy: PlanStrategy,
    /// Ordered sub-queries; length >= 1 for non-error strategies.
    pub sub_queries: Vec<String>,
    /// Instructions handed to the synthesis backend.
    pub synthesis_instructions: String,
    /// Estimated total duration in seconds.
    pub estimated_duration_secs: u64,
}

impl ResearchPlan {
    /// Enforce plan invariants on a backend-provided plan.
    ///
    /// Empty sub-query lists are replaced by the original query; `simple`
    /// plans carrying more than one sub-query are reclassified `standard`
    /// rather than dropping work.
    pub fn normalized(mut self) -> Self {
        self.sub_queries.retain(|q| !q.trim().is_empty());
        if self.sub_queries.is_empty() {
            self.sub_queries.push(self.query.clone());
        }
        if self.strategy == PlanStrategy::Simple && self.sub_queries.len() > 1 {
            self.strategy = PlanStrategy::Standard;
        }
        if self.synthesis_instructions.trim().is_empty() {
            self.synthesis_instructions = DEFAULT_SYNTHESIS_INSTRUCTIONS.to_string();
        }
        self
    }

    /// Plan recorded when the planning backend failed outright.
    pub fn error_plan(query: &str, message: &str) -> Self {
        ResearchPlan {
            query: query.to_string(),
            strategy: PlanStrategy::Error,
            sub_queries: vec![query.to_string()],
            synthesis_instructions: format!("Planning failed: {}", message),
            estimated_duration_secs: PlanStrategy::Error.duration_estimate(),
        }
    }

    /// Number of threads this plan will dispatch.
    pub fn thread_count(&self) -> usize {
        self.sub_queries.len()
    }
}

/// Outcome of one planning backend call, resolved once at the plan
/// generator boundary so the shape ambiguity never leaks downstream.
#[derive(Debug, Clone)]
pub enum PlanResponse {
    /// The backend returned a plan coercible to [`ResearchPlan`].
    Structured(ResearchPlan),
    /// The backend returned text the structured parser could not use.
    Raw(String),
}

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:sub[\s_-]?quer(?:y|ies)|sub[\s_-]?questions?|research questions?)\b\s*:?",
    )
    .expect("label regex")
});

static INLINE_ITEM_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)\d{1,2}[.)]\s+").expect("inline item regex"));

static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d{1,2}[.)])\s+(.+)$").expect("list item regex"));

/// Build a usable plan from unparsable planner output.
///
/// Deterministic and total: classifies complexity by keyword presence
/// (complex tokens win over simple ones), recovers up to five sub-queries
/// from a labeled section followed by numbered or bulleted items, and falls
/// back to the original query when nothing is recoverable.
pub fn fallback_plan(raw: &str, query: &str) -> ResearchPlan {
    let lower = raw.to_lowercase();

    let strategy = if ["complex", "multiple", "multi-part"]
        .iter()
        .any(|token| lower.contains(token))
    {
        PlanStrategy::Complex
    } else if ["simple", "straightforward"]
        .iter()
        .any(|token| lower.contains(token))
    {
        PlanStrategy::Simple
    } else {
        PlanStrategy::Standard
    };

    let mut sub_queries = recover_sub_queries(raw);
    sub_queries.truncate(MAX_RECOVERED_SUB_QUERIES);
    if sub_queries.is_empty() {
        sub_queries.push(query.to_string());
    }

    let mut plan = ResearchPlan {
        query: query.to_string(),
        strategy,
        sub_queries,
        synthesis_instructions: DEFAULT_SYNTHESIS_INSTRUCTIONS.to_string(),
        estimated_duration_secs: 0,
    }
    .normalized();
    plan.estimated_duration_secs = plan.strategy.duration_estimate();
    plan
}

/// Recover an ordered sub-query list from a labeled section in raw text.
fn recover_sub_queries(text: &str) -> Vec<String> {
    let Some(label) = LABEL_RE.find(text) else {
        return Vec::new();
    };
    let tail = &text[label.end()..];

    let mut items = Vec::new();
    let mut lines = tail.lines();

    // Items may sit inline on the label's own line ("... : 1. x 2. y").
    if let Some(first) = lines.next() {
        if INLINE_ITEM_SPLIT_RE.is_match(first) {
            for piece in INLINE_ITEM_SPLIT_RE.split(first) {
                let piece = clean_item(piece);
                if !piece.is_empty() {
                    items.push(piece);
                }
            }
        }
    }

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if items.is_empty() {
                continue;
            }
            break;
        }
        if let Some(caps) = LIST_ITEM_RE.captures(trimmed) {
            let item = clean_item(&caps[1]);
            if !item.is_empty() {
                items.push(item);
            }
        } else if !items.is_empty() {
            // The list ended; ignore trailing prose.
            break;
        }
    }

    items
}

fn clean_item(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_inline_numbered_items_after_label() {
        let raw = "This requires multiple sub-queries: 1. topic X 2. topic Y";
        let plan = fallback_plan(raw, "original question");

        assert_eq!(plan.strategy, PlanStrategy::Complex);
        assert_eq!(plan.sub_queries, vec!["topic X", "topic Y"]);
        assert_eq!(plan.estimated_duration_secs, 180);
    }

    #[test]
    fn test_numbered_lines_after_label() {
        let raw = "Research questions:\n1. What is A?\n2) What is B?\n3. What is C?\n\nNotes follow.";
        let plan = fallback_plan(raw, "q");

        assert_eq!(
            plan.sub_queries,
            vec!["What is A?", "What is B?", "What is C?"]
        );
        assert_eq!(plan.strategy, PlanStrategy::Standard);
        assert_eq!(plan.estimated_duration_secs, 90);
    }

    #[test]
    fn test_bulleted_lines_after_label() {
        let raw = "Sub-questions:\n- first angle\n* second angle\n• third angle";
        let plan = fallback_plan(raw, "q");
        assert_eq!(
            plan.sub_queries,
            vec!["first angle", "second angle", "third angle"]
        );
    }

    #[test]
    fn test_recovered_items_truncated_to_five() {
        let raw =
            "sub-queries:\n1. a\n2. b\n3. c\n4. d\n5. e\n6. f\n7. g";
        let plan = fallback_plan(raw, "q");
        assert_eq!(plan.sub_queries.len(), 5);
        assert_eq!(plan.sub_queries[4], "e");
    }

    #[test]
    fn test_simple_keyword_selects_simple() {
        let plan = fallback_plan("This is a straightforward question.", "q");
        assert_eq!(plan.strategy, PlanStrategy::Simple);
        assert_eq!(plan.sub_queries, vec!["q"]);
        assert_eq!(plan.estimated_duration_secs, 30);
    }

    #[test]
    fn test_complex_wins_over_simple() {
        let plan = fallback_plan("A simple-looking but actually complex question", "q");
        assert_eq!(plan.strategy, PlanStrategy::Complex);
    }

    #[test]
    fn test_no_recoverable_items_falls_back_to_query() {
        let plan = fallback_plan("no useful structure here", "what is rust?");
        assert_eq!(plan.sub_queries, vec!["what is rust?"]);
        assert_eq!(plan.strategy, PlanStrategy::Standard);
    }

    #[test]
    fn test_simple_with_recovered_items_reclassified_standard() {
        let raw = "Keep it simple. Sub-queries: 1. alpha 2. beta";
        let plan = fallback_plan(raw, "q");
        // simple implies exactly one sub-query, so the plan is promoted.
        assert_eq!(plan.strategy, PlanStrategy::Standard);
        assert_eq!(plan.sub_queries.len(), 2);
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t\n  ")]
    #[case("sub-queries:")]
    #[case("研究の質問: 1. 何か")]
    #[case("[]{}()<>!@#$%^&*")]
    #[case("1. 2. 3. 4.")]
    fn test_parser_is_total(#[case] raw: &str) {
        let plan = fallback_plan(raw, "fallback query");
        assert!(!plan.sub_queries.is_empty());
        assert!(matches!(
            plan.strategy,
            PlanStrategy::Simple | PlanStrategy::Standard | PlanStrategy::Complex
        ));
        assert!(plan.sub_queries.iter().all(|q| !q.trim().is_empty()));
    }

    #[test]
    fn test_parser_total_on_large_input() {
        let raw = "word ".repeat(50_000);
        let plan = fallback_plan(&raw, "q");
        assert_eq!(plan.sub_queries, vec!["q"]);
    }

    #[test]
    fn test_normalized_replaces_empty_sub_queries() {
        let plan = ResearchPlan {
            query: "q".to_string(),
            strategy: PlanStrategy::Standard,
            sub_queries: vec!["  ".to_string(), String::new()],
            synthesis_instructions: "do it".to_string(),
            estimated_duration_secs: 90,
        }
        .normalized();
        assert_eq!(plan.sub_queries, vec!["q"]);
    }

    #[test]
    fn test_error_plan_shape() {
        let plan = ResearchPlan::error_plan("q", "backend unavailable");
        assert_eq!(plan.strategy, PlanStrategy::Error);
        assert_eq!(plan.sub_queries, vec!["q"]);
        assert_eq!(plan.estimated_duration_secs, 0);
    }

    #[test]
    fn test_plan_json_round_trip() {
        let plan = fallback_plan("sub-queries: 1. a 2. b", "q");
        let json = serde_json::to_string(&plan).unwrap();
        let back: ResearchPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sub_queries, plan.sub_queries);
        assert_eq!(back.strategy, plan.strategy);
    }
}
