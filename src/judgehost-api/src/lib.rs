pub mod plan;

pub use plan::{EvaluationPlan, Program, ScoringMode, TestCase, TestGroup, VerdictMode};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum Verdict {
    Accepted,
    /// Output was rejected by the validator or the diff grader
    WrongAnswer,
    /// Submission exited with non-zero code or was killed by a signal
    RuntimeError,
    TimeLimitExceeded,
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Accepted
    }
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    /// Position in the worseness ranking used when merging group verdicts.
    /// Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Accepted => 0,
            Verdict::RuntimeError => 1,
            Verdict::TimeLimitExceeded => 2,
            Verdict::WrongAnswer => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    TestCase,
    TestGroup,
}

/// Outcome of one node of the test tree.
/// Exactly one is emitted per evaluated case or group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub kind: ResultKind,
    /// Name of the case or group this result belongs to
    pub name: String,
    pub verdict: Verdict,
    /// Empty `Min`/`Max` groups score +inf/-inf, written as `"inf"`/`"-inf"`
    #[serde(with = "score_repr")]
    pub score: f64,
    pub time_usage_ms: u64,
    /// Judge message reported by the validator, or diff description
    #[serde(default)]
    pub message: Option<String>,
}

/// JSON has no infinities, so non-finite scores travel as strings
mod score_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if score.is_finite() {
            serializer.serialize_f64(*score)
        } else if score.is_nan() {
            serializer.serialize_str("nan")
        } else if *score > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(score) => Ok(score),
            Repr::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &"a number, \"inf\", \"-inf\" or \"nan\"",
                )),
            },
        }
    }
}

impl TestResult {
    pub fn new(kind: ResultKind, name: &str) -> TestResult {
        TestResult {
            kind,
            name: name.to_string(),
            verdict: Verdict::Accepted,
            score: 0.0,
            time_usage_ms: 0,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ranking() {
        let mut all = vec![
            Verdict::WrongAnswer,
            Verdict::Accepted,
            Verdict::TimeLimitExceeded,
            Verdict::RuntimeError,
        ];
        all.sort_by_key(|v| v.severity());
        assert_eq!(
            all,
            vec![
                Verdict::Accepted,
                Verdict::RuntimeError,
                Verdict::TimeLimitExceeded,
                Verdict::WrongAnswer
            ]
        );
    }

    #[test]
    fn verdict_strings() {
        assert_eq!(Verdict::TimeLimitExceeded.to_string(), "TimeLimitExceeded");
        assert_eq!(
            "WrongAnswer".parse::<Verdict>().unwrap(),
            Verdict::WrongAnswer
        );
        assert!("Skipped".parse::<Verdict>().is_err());
    }

    #[test]
    fn result_json_shape() {
        let mut res = TestResult::new(ResultKind::TestCase, "01");
        res.verdict = Verdict::RuntimeError;
        res.time_usage_ms = 12;
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["kind"], "TestCase");
        assert_eq!(json["verdict"], "RuntimeError");
        assert_eq!(json["time_usage_ms"], 12);
        assert!(json["message"].is_null());
        assert_eq!(json["score"], 0.0);
    }

    #[test]
    fn infinite_scores_survive_json() {
        for score in [f64::INFINITY, f64::NEG_INFINITY, 2.5] {
            let mut res = TestResult::new(ResultKind::TestGroup, "g");
            res.score = score;
            let line = serde_json::to_string(&res).unwrap();
            let back: TestResult = serde_json::from_str(&line).unwrap();
            assert_eq!(back, res, "{}", line);
        }
        let json = serde_json::to_value(&TestResult {
            score: f64::NEG_INFINITY,
            ..TestResult::new(ResultKind::TestGroup, "g")
        })
        .unwrap();
        assert_eq!(json["score"], "-inf");
    }

    #[test]
    fn unknown_score_text_rejected() {
        let line = r#"{"kind":"TestCase","name":"a","verdict":"Accepted","score":"lots","time_usage_ms":0}"#;
        assert!(serde_json::from_str::<TestResult>(line).is_err());
    }
}
