//! Evaluation request: what to run and how to grade it
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Compiled, runnable artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    /// Directory containing the build. Exposed read-only to the sandbox
    /// and used as its working directory.
    pub program_root: PathBuf,
    pub run_command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMode {
    Sum,
    /// Accumulates exactly like `Sum`: child scores are added, not averaged.
    Avg,
    Min,
    Max,
}

impl Default for ScoringMode {
    fn default() -> Self {
        ScoringMode::Sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictMode {
    /// Group verdict is the worst verdict among children
    WorstError,
    /// Group verdict is the verdict of the first rejected child
    FirstError,
    AlwaysAccept,
}

impl Default for VerdictMode {
    fn default() -> Self {
        VerdictMode::WorstError
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input_path: PathBuf,
    /// Reference answer
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestGroup {
    pub name: String,
    pub groups: Vec<TestGroup>,
    pub cases: Vec<TestCase>,
    pub scoring_mode: ScoringMode,
    pub verdict_mode: VerdictMode,
    /// Group is accepted as soon as at least one child was accepted
    pub accept_if_any_accepted: bool,
    /// Stop evaluating children after the first rejected one
    pub break_on_fail: bool,
    /// Case score on acceptance, unless the validator reports scores
    pub accept_score: f64,
    /// Case score on rejection, unless the validator reports scores
    pub reject_score: f64,
    /// Passed verbatim to the output validator, or parsed as diff
    /// tolerance flags when there is none
    pub output_validator_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPlan {
    pub program: Program,
    #[serde(default)]
    pub validator: Option<Program>,
    pub root_group: TestGroup,
    pub time_limit_ms: u64,
    pub mem_limit_kb: u64,
    /// Validator writes `score.txt` which overrides group accept/reject scores
    #[serde(default)]
    pub scoring_validator: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_from_json() {
        let plan: EvaluationPlan = serde_json::from_str(
            r#"{
                "program": {"program_root": "/sub", "run_command": ["./main"]},
                "root_group": {
                    "break_on_fail": true,
                    "verdict_mode": "FirstError",
                    "cases": [{"name": "01", "input_path": "/d/01.in", "output_path": "/d/01.ans"}]
                },
                "time_limit_ms": 1000,
                "mem_limit_kb": 262144
            }"#,
        )
        .unwrap();
        assert!(plan.validator.is_none());
        assert!(!plan.scoring_validator);
        assert!(plan.root_group.break_on_fail);
        assert_eq!(plan.root_group.verdict_mode, VerdictMode::FirstError);
        assert_eq!(plan.root_group.scoring_mode, ScoringMode::Sum);
        assert_eq!(plan.root_group.cases[0].name, "01");
        assert!(plan.root_group.groups.is_empty());
    }
}
