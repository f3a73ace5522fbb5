//! Decomposition heuristic, planner prompt template, and lenient JSON parsing.

use crate::model::Priority;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Maximum sub-tasks accepted from a single planner response; extra entries truncated.
pub const MAX_SUBTASKS: usize = 6;

/// Multi-lingual decomposition indicator words (English + Traditional Chinese minimum).
///
/// A prompt needs at least two hits from this list (when word count > 8) to be
/// considered multi-step, absent other signals (separators, numbered lists).
static INDICATORS: &[&str] = &[
    // English imperative/sequencing vocabulary
    "refactor", "implement", "add", "update", "fix", "remove", "create", "migrate",
    "then", "after", "also", "and then", "next", "finally", "first", "write tests",
    "add tests", "document", "review", "test", "design",
    // Traditional Chinese equivalents
    "重構", "實作", "新增", "更新", "修復", "移除", "建立", "遷移",
    "然後", "之後", "接著", "最後", "首先", "撰寫測試", "文件", "審查", "測試", "設計",
];

#[allow(clippy::expect_used)] // pattern is a fixed literal, always valid
static NUMBERED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.)]\s").expect("static regex is valid"));

/// Heuristic gate deciding whether a prompt warrants decomposition into sub-tasks.
///
/// Rules (in order):
/// - word count ≤ 8 → false
/// - ≥ 2 indicator hits → true
/// - word count > 12 and ≥ 2 comma/semicolon/ideographic-comma separators → true
/// - a numbered-list pattern (`\d+[.)] `) anywhere → true
/// - otherwise false
#[must_use]
pub fn should_decompose(prompt: &str) -> bool {
    let word_count = prompt.split_whitespace().count();
    if word_count <= 8 {
        return false;
    }

    let lower = prompt.to_lowercase();
    let indicator_hits = INDICATORS.iter().filter(|ind| lower.contains(*ind)).count();
    if indicator_hits >= 2 {
        return true;
    }

    if word_count > 12 {
        let separator_hits = prompt.chars().filter(|c| matches!(c, ',' | ';' | '、')).count();
        if separator_hits >= 2 {
            return true;
        }
    }

    NUMBERED_LIST.is_match(prompt)
}

/// Complexity tier reported by the planner for one sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedComplexity {
    /// Maps to `Priority::Low`.
    Low,
    /// Maps to `Priority::Medium`.
    Medium,
    /// Maps to `Priority::High`.
    High,
}

impl EstimatedComplexity {
    /// Map the planner's complexity tier to an initial scheduling priority
    /// (before the zero-dependency promotion is applied).
    #[must_use]
    pub const fn to_priority(self) -> Priority {
        match self {
            Self::Low => Priority::Low,
            Self::Medium => Priority::Medium,
            Self::High => Priority::High,
        }
    }
}

/// One entry of the planner's JSON contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerSubTask {
    /// Short title (planner is instructed to keep this ≤80 chars).
    pub title: String,
    /// Full instruction prompt for the sub-agent.
    pub prompt: String,
    /// Dependency indices into the same list, each strictly less than this entry's position.
    #[serde(default)]
    pub dependencies: Vec<usize>,
    /// Advisory-only parallelism hint. Preserved for forward compatibility; never
    /// consulted by the scheduler.
    #[serde(default)]
    pub can_parallel: bool,
    /// Complexity tier.
    pub estimated_complexity: EstimatedComplexity,
}

/// Top-level planner response envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerResponse {
    /// The decomposed sub-tasks, in dependency-respecting order.
    pub subtasks: Vec<PlannerSubTask>,
}

#[allow(clippy::expect_used)] // pattern is a fixed literal, always valid
static EMBEDDED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\{[\s\S]*"subtasks"[\s\S]*\}"#).expect("static regex is valid")
});

/// Parse a planner response leniently: try a direct decode first, then fall back to
/// extracting the first substring that looks like a `{"subtasks": ...}` object.
///
/// # Errors
///
/// Returns `Err` with a diagnostic message if neither strategy produces valid JSON
/// matching the contract.
pub fn parse_planner_response(raw: &str) -> Result<PlannerResponse, String> {
    if let Ok(parsed) = serde_json::from_str::<PlannerResponse>(raw) {
        return Ok(parsed);
    }

    if let Some(m) = EMBEDDED_JSON.find(raw) {
        if let Ok(parsed) = serde_json::from_str::<PlannerResponse>(m.as_str()) {
            return Ok(parsed);
        }
    }

    Err(format!("could not locate a valid subtasks JSON object in: {raw}"))
}

/// The fixed instruction template sent to the planner CLI during phase 1.
#[must_use]
pub fn planner_instruction(original_prompt: &str) -> String {
    format!(
        "You are decomposing a coding task into independent sub-tasks. \
         Respond with ONLY a JSON object, no prose, matching this exact shape:\n\
         {{\"subtasks\": [{{\"title\": string, \"prompt\": string, \
         \"dependencies\": [int], \"can_parallel\": bool, \
         \"estimated_complexity\": \"low\"|\"medium\"|\"high\"}}]}}\n\
         Rules: at most {MAX_SUBTASKS} entries; dependencies are zero-based indices \
         into this same array, each strictly less than its own entry's position.\n\n\
         Task: {original_prompt}"
    )
}

/// Outcome of applying the decomposition result: either a validated plan, truncated
/// to `MAX_SUBTASKS` entries, or a signal that the caller should fall back to direct
/// execution (parse failure, or fewer than two sub-tasks).
pub enum DecompositionOutcome {
    /// A usable plan (already truncated to `MAX_SUBTASKS`).
    Plan(Vec<PlannerSubTask>),
    /// Fall back to direct execution with the original prompt.
    Fallback,
}

/// Apply §4.1's parse-then-validate rules to a raw planner response string.
#[must_use]
pub fn decompose(raw: &str) -> DecompositionOutcome {
    match parse_planner_response(raw) {
        Ok(mut response) => {
            if response.subtasks.len() <= 1 {
                DecompositionOutcome::Fallback
            } else {
                response.subtasks.truncate(MAX_SUBTASKS);
                DecompositionOutcome::Plan(response.subtasks)
            }
        }
        Err(_) => DecompositionOutcome::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_words_is_false() {
        assert!(!should_decompose("fix the login bug in the auth module now"));
    }

    #[test]
    fn nine_words_no_indicators_is_false() {
        assert!(!should_decompose("fix the login bug in the auth module today please"));
    }

    #[test]
    fn nine_words_two_indicators_is_true() {
        assert!(should_decompose("refactor the login flow and add tests for it please"));
    }

    #[test]
    fn trivial_fallback_scenario_s1() {
        assert!(!should_decompose("fix bug"));
    }

    #[test]
    fn single_task_plan_scenario_s2() {
        assert!(should_decompose(
            "refactor the authentication module and add tests and update docs"
        ));

        let raw = r#"{"subtasks":[{"title":"Refactor auth","prompt":"do it","dependencies":[],"can_parallel":true,"estimated_complexity":"medium"}]}"#;
        match decompose(raw) {
            DecompositionOutcome::Fallback => {}
            DecompositionOutcome::Plan(_) => panic!("expected fallback for single-entry plan"),
        }
    }

    #[test]
    fn numbered_list_triggers_decomposition() {
        assert!(should_decompose("1. do the first thing 2. do the second thing"));
    }

    #[test]
    fn parse_handles_embedded_prose() {
        let raw = "Sure, here is the plan:\n{\"subtasks\":[{\"title\":\"a\",\"prompt\":\"p\",\"dependencies\":[],\"can_parallel\":false,\"estimated_complexity\":\"low\"},{\"title\":\"b\",\"prompt\":\"p2\",\"dependencies\":[0],\"can_parallel\":false,\"estimated_complexity\":\"high\"}]}\nHope that helps!";
        let parsed = parse_planner_response(raw).expect("should parse embedded JSON");
        assert_eq!(parsed.subtasks.len(), 2);
    }

    #[test]
    fn seven_subtasks_truncated_to_six() {
        let entries: Vec<String> = (0..7)
            .map(|i| {
                format!(
                    "{{\"title\":\"t{i}\",\"prompt\":\"p\",\"dependencies\":[],\"can_parallel\":false,\"estimated_complexity\":\"low\"}}"
                )
            })
            .collect();
        let raw = format!("{{\"subtasks\":[{}]}}", entries.join(","));
        match decompose(&raw) {
            DecompositionOutcome::Plan(plan) => assert_eq!(plan.len(), MAX_SUBTASKS),
            DecompositionOutcome::Fallback => panic!("expected a plan"),
        }
    }

    #[test]
    fn malformed_json_falls_back() {
        match decompose("not json at all") {
            DecompositionOutcome::Fallback => {}
            DecompositionOutcome::Plan(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn should_decompose_is_idempotent() {
        let prompt = "refactor the authentication module and add tests and update docs";
        assert_eq!(should_decompose(prompt), should_decompose(prompt));
    }
}
