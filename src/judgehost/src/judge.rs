use crate::{
    diff::diff_output,
    error::{EvalError, StagingContext},
    evaluator::Session,
    file_linker::FileBase,
    sandbox::SandboxRole,
};
use judgehost_api::{ResultKind, TestCase, TestGroup, TestResult, Verdict};
use tracing::{debug, warn};

pub(crate) struct JudgeRequest<'r> {
    pub(crate) case: &'r TestCase,
    /// Group owning the case; provides scores and validator flags
    pub(crate) group: &'r TestGroup,
}

/// Runs the submission on a single test case
pub(crate) struct Judge<'s, 'a> {
    pub(crate) req: JudgeRequest<'s>,
    pub(crate) session: &'s mut Session<'a>,
}

impl Judge<'_, '_> {
    pub(crate) fn judge(mut self) -> Result<TestResult, EvalError> {
        debug!(case = %self.req.case.name, "judging case");
        let outcome = self.run_case();
        let cleared = self.clear_staging();
        let result = match (outcome, cleared) {
            (Ok(result), Ok(())) => result,
            (Ok(_), Err(err)) => return Err(err),
            (Err(err), Ok(())) => return Err(err),
            (Err(err), Err(clear_err)) => {
                warn!(error = %clear_err, "failed to clear staging after error");
                return Err(err);
            }
        };
        debug!(
            case = %result.name,
            verdict = %result.verdict,
            score = result.score,
            time_usage_ms = result.time_usage_ms,
            "case judged"
        );
        self.session.evaluator.publish(&result)?;
        Ok(result)
    }

    fn clear_staging(&self) -> Result<(), EvalError> {
        let evaluator = self.session.evaluator;
        let linkers = std::iter::once(&evaluator.linker).chain(evaluator.val_linker.as_ref());
        for linker in linkers {
            linker.clear().staging(linker.read_base())?;
        }
        Ok(())
    }

    fn run_case(&mut self) -> Result<TestResult, EvalError> {
        let evaluator = self.session.evaluator;
        let case = self.req.case;
        let group = self.req.group;
        let linker = &evaluator.linker;

        let case_base = FileBase::new(
            evaluator.root.join("cases").join(&case.name),
            evaluator.env.judge_group_id,
            true,
        );
        case_base.create().staging(case_base.path())?;
        linker
            .link_file(&case.input_path, "input", false)
            .staging(&case.input_path)?;
        for name in ["output", "error"] {
            let path = case_base.write_file(name, b"").staging(case_base.path())?;
            linker.link_file(&path, name, true).staging(&path)?;
        }

        let exit = self
            .session
            .program
            .run(&evaluator.plan.program.run_command)
            .map_err(|source| EvalError::SandboxRun {
                role: SandboxRole::Submission,
                source,
            })?;
        if let Err(err) = evaluator.reset_permissions() {
            warn!(error = %err, case = %case.name, "permission reset after submission run failed");
        }

        let mut result = TestResult::new(ResultKind::TestCase, &case.name);
        result.time_usage_ms = exit.time_usage_ms;
        // crashed and timed out runs score 0
        if exit.crashed() {
            result.verdict = Verdict::RuntimeError;
            return Ok(result);
        }
        if exit.timed_out() {
            result.verdict = Verdict::TimeLimitExceeded;
            return Ok(result);
        }

        let produced = linker.path_for("output", true);
        let scoring = evaluator.plan.scoring_validator;
        let (accepted, score) = match self.session.validator.as_mut() {
            Some(validator) => {
                let out = validator.validate(
                    &group.output_validator_flags,
                    &case.input_path,
                    &produced,
                    &case.output_path,
                )?;
                result.message = out.judge_message;
                (out.accepted, scoring.then_some(out.score))
            }
            None => {
                let diff = diff_output(
                    &*evaluator.env.diff,
                    &case.output_path,
                    &produced,
                    &group.output_validator_flags,
                )?;
                result.message = Some(diff.description);
                // nothing reports a score, and group scores do not apply
                (diff.matched, scoring.then_some(0.0))
            }
        };

        if accepted {
            result.score = score.unwrap_or(group.accept_score);
        } else {
            result.verdict = Verdict::WrongAnswer;
            result.score = score.unwrap_or(group.reject_score);
        }
        Ok(result)
    }
}
