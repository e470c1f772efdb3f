//! Combines child results into a group result.
use judgehost_api::{ResultKind, ScoringMode, TestGroup, TestResult, Verdict, VerdictMode};

/// Computes the result of `group` from the results of the children that were
/// actually evaluated, in evaluation order.
///
/// With no children the score is the identity of the scoring mode:
/// 0 for `Sum`/`Avg`, +inf for `Min` and -inf for `Max`.
pub fn merge(children: &[TestResult], group: &TestGroup) -> TestResult {
    let mut result = TestResult::new(ResultKind::TestGroup, &group.name);
    result.score = match group.scoring_mode {
        ScoringMode::Sum | ScoringMode::Avg => 0.0,
        ScoringMode::Min => f64::INFINITY,
        ScoringMode::Max => f64::NEG_INFINITY,
    };
    let mut any_accepted = false;
    for child in children {
        if child.verdict.is_accepted() {
            any_accepted = true;
        } else {
            match group.verdict_mode {
                VerdictMode::WorstError => {
                    if child.verdict.severity() > result.verdict.severity() {
                        result.verdict = child.verdict;
                    }
                }
                VerdictMode::FirstError => {
                    if result.verdict.is_accepted() {
                        result.verdict = child.verdict;
                    }
                }
                VerdictMode::AlwaysAccept => {}
            }
        }

        result.score = match group.scoring_mode {
            ScoringMode::Sum | ScoringMode::Avg => result.score + child.score,
            ScoringMode::Min => result.score.min(child.score),
            ScoringMode::Max => result.score.max(child.score),
        };
        result.time_usage_ms += child.time_usage_ms;
    }

    if group.verdict_mode == VerdictMode::AlwaysAccept
        || (any_accepted && group.accept_if_any_accepted)
    {
        result.verdict = Verdict::Accepted;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(verdict: Verdict, score: f64) -> TestResult {
        let mut res = TestResult::new(ResultKind::TestCase, "case");
        res.verdict = verdict;
        res.score = score;
        res
    }

    fn group(scoring_mode: ScoringMode, verdict_mode: VerdictMode) -> TestGroup {
        TestGroup {
            name: "g".to_string(),
            scoring_mode,
            verdict_mode,
            ..Default::default()
        }
    }

    fn verdicts(items: &[Verdict]) -> Vec<TestResult> {
        items.iter().map(|v| child(*v, 0.0)).collect()
    }

    #[test]
    fn sum_is_order_independent() {
        let g = group(ScoringMode::Sum, VerdictMode::WorstError);
        let mut children = vec![
            child(Verdict::Accepted, 1.0),
            child(Verdict::Accepted, 2.5),
            child(Verdict::Accepted, 0.0),
        ];
        assert_eq!(merge(&children, &g).score, 3.5);
        children.reverse();
        assert_eq!(merge(&children, &g).score, 3.5);
    }

    #[test]
    fn avg_accumulates_like_sum() {
        let g = group(ScoringMode::Avg, VerdictMode::WorstError);
        let children = vec![child(Verdict::Accepted, 4.0), child(Verdict::Accepted, 2.0)];
        assert_eq!(merge(&children, &g).score, 6.0);
    }

    #[test]
    fn min_max() {
        let children = vec![
            child(Verdict::Accepted, 3.0),
            child(Verdict::WrongAnswer, -1.0),
            child(Verdict::Accepted, 7.0),
        ];
        assert_eq!(
            merge(&children, &group(ScoringMode::Min, VerdictMode::WorstError)).score,
            -1.0
        );
        assert_eq!(
            merge(&children, &group(ScoringMode::Max, VerdictMode::WorstError)).score,
            7.0
        );
    }

    #[test]
    fn empty_group_boundaries() {
        let min = merge(&[], &group(ScoringMode::Min, VerdictMode::WorstError));
        assert_eq!(min.score, f64::INFINITY);
        assert_eq!(min.verdict, Verdict::Accepted);
        assert_eq!(
            merge(&[], &group(ScoringMode::Max, VerdictMode::WorstError)).score,
            f64::NEG_INFINITY
        );
        assert_eq!(
            merge(&[], &group(ScoringMode::Sum, VerdictMode::WorstError)).score,
            0.0
        );
        assert_eq!(
            merge(&[], &group(ScoringMode::Avg, VerdictMode::WorstError)).score,
            0.0
        );
    }

    #[test]
    fn worst_error() {
        let g = group(ScoringMode::Sum, VerdictMode::WorstError);
        let res = merge(
            &verdicts(&[
                Verdict::Accepted,
                Verdict::RuntimeError,
                Verdict::WrongAnswer,
            ]),
            &g,
        );
        assert_eq!(res.verdict, Verdict::WrongAnswer);
        let res = merge(
            &verdicts(&[Verdict::TimeLimitExceeded, Verdict::RuntimeError]),
            &g,
        );
        assert_eq!(res.verdict, Verdict::TimeLimitExceeded);
    }

    #[test]
    fn first_error() {
        let g = group(ScoringMode::Sum, VerdictMode::FirstError);
        let res = merge(
            &verdicts(&[
                Verdict::Accepted,
                Verdict::TimeLimitExceeded,
                Verdict::WrongAnswer,
            ]),
            &g,
        );
        assert_eq!(res.verdict, Verdict::TimeLimitExceeded);
    }

    #[test]
    fn always_accept() {
        let g = group(ScoringMode::Sum, VerdictMode::AlwaysAccept);
        let res = merge(
            &verdicts(&[Verdict::WrongAnswer, Verdict::RuntimeError]),
            &g,
        );
        assert_eq!(res.verdict, Verdict::Accepted);
    }

    #[test]
    fn accept_if_any_accepted() {
        let mut g = group(ScoringMode::Sum, VerdictMode::WorstError);
        let children = verdicts(&[Verdict::Accepted, Verdict::WrongAnswer]);
        assert_eq!(merge(&children, &g).verdict, Verdict::WrongAnswer);
        g.accept_if_any_accepted = true;
        assert_eq!(merge(&children, &g).verdict, Verdict::Accepted);
        // nothing accepted: override does not apply
        let children = verdicts(&[Verdict::RuntimeError, Verdict::WrongAnswer]);
        assert_eq!(merge(&children, &g).verdict, Verdict::WrongAnswer);
    }

    #[test]
    fn group_result_shape() {
        let g = group(ScoringMode::Sum, VerdictMode::WorstError);
        let mut a = child(Verdict::Accepted, 1.0);
        a.time_usage_ms = 10;
        let mut b = child(Verdict::Accepted, 1.0);
        b.time_usage_ms = 32;
        let res = merge(&[a, b], &g);
        assert_eq!(res.kind, ResultKind::TestGroup);
        assert_eq!(res.name, "g");
        assert_eq!(res.time_usage_ms, 42);
        assert_eq!(res.message, None);
    }
}
