//! Output validator protocol.
//!
//! The validator is invoked as
//! `<run command> <input> <judge answer> <feedback dir> [group flags...]`
//! with the submission output on stdin. Exit code 42 accepts, 43 rejects.
//! It may leave `judgemessage.txt` and, when it is a scoring validator,
//! must leave `score.txt` in the feedback dir.
use crate::{
    error::{EvalError, StagingContext},
    file_linker::FileLinker,
    permissions::PermissionFixer,
    sandbox::SandboxGuard,
};
use std::path::Path;
use tracing::{debug, warn};

pub const EXITCODE_AC: i32 = 42;
pub const EXITCODE_WA: i32 = 43;
const JUDGE_MESSAGE_FILE: &str = "judgemessage.txt";
const SCORE_FILE: &str = "score.txt";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatorOutput {
    pub accepted: bool,
    pub score: f64,
    pub judge_message: Option<String>,
}

pub(crate) struct Validator<'a> {
    pub(crate) sandbox: &'a mut SandboxGuard,
    pub(crate) linker: &'a FileLinker,
    pub(crate) run_command: &'a [String],
    pub(crate) permissions: &'a dyn PermissionFixer,
    /// Directory handed to the permission fixer after each run
    pub(crate) permissions_root: &'a Path,
    pub(crate) scoring: bool,
}

impl Validator<'_> {
    fn command(&self, group_flags: &[String]) -> Vec<String> {
        let mut argv = self.run_command.to_vec();
        for path in [
            self.linker.path_for("input", false),
            self.linker.path_for("judge_answer", false),
            self.linker.path_for(".", true),
        ] {
            argv.push(path.to_string_lossy().into_owned());
        }
        argv.extend(group_flags.iter().cloned());
        argv
    }

    fn crash_report(&self) -> Result<String, EvalError> {
        let errors = std::fs::read_to_string(self.linker.path_for("error", true)).map_err(
            |source| EvalError::ValidatorReport {
                what: "errors",
                source,
            },
        )?;
        let output = std::fs::read_to_string(self.linker.path_for("output", true)).map_err(
            |source| EvalError::ValidatorReport {
                what: "output",
                source,
            },
        )?;
        Ok(format!("{} {}", errors, output))
    }

    fn read_score(&self) -> Result<f64, EvalError> {
        let raw = std::fs::read_to_string(self.linker.path_for(SCORE_FILE, true))
            .map_err(EvalError::MissingScore)?;
        let parsed = raw.trim().parse::<f64>();
        parsed.map_err(|source| EvalError::BadScore { raw, source })
    }

    pub(crate) fn validate(
        &mut self,
        group_flags: &[String],
        input_path: &Path,
        team_output_path: &Path,
        answer_path: &Path,
    ) -> Result<ValidatorOutput, EvalError> {
        self.linker
            .link_file(input_path, "input", false)
            .staging(input_path)?;
        self.linker
            .link_file(team_output_path, "team_output", false)
            .staging(team_output_path)?;
        self.linker
            .link_file(answer_path, "judge_answer", false)
            .staging(answer_path)?;

        let argv = self.command(group_flags);
        let role = self.sandbox.role();
        let exit = self
            .sandbox
            .run(&argv)
            .map_err(|source| EvalError::SandboxRun { role, source })?;
        self.permissions
            .reset(self.permissions_root)
            .map_err(EvalError::ResetPermissions)?;

        if exit.timed_out() {
            return Err(EvalError::ValidatorTimedOut);
        }
        let accepted = if exit.crashed_with(EXITCODE_AC) {
            true
        } else if exit.crashed_with(EXITCODE_WA) {
            false
        } else {
            warn!(termination = ?exit.termination, "output validator terminated abnormally");
            return Err(EvalError::ValidatorCrashed(self.crash_report()?));
        };
        debug!(accepted, "output validator finished");

        let mut output = ValidatorOutput {
            accepted,
            ..Default::default()
        };
        output.judge_message =
            std::fs::read_to_string(self.linker.path_for(JUDGE_MESSAGE_FILE, true)).ok();
        if self.scoring {
            output.score = self.read_score()?;
        }
        Ok(output)
    }
}
