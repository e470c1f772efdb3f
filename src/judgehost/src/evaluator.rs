
use crate::{
    config::{JudgehostConfig, LimitsConfig},
    diff::{DiffEngine, TokenDiff},
    error::{EvalError, StagingContext},
    file_linker::FileLinker,
    judge::{Judge, JudgeRequest},
    merge::merge,
    permissions::{CommandPermissionFixer, NoopPermissionFixer, PermissionFixer},
    sandbox::{Backend, ProcessBackend, SandboxArgs, SandboxGuard, SandboxRole},
    validator::Validator,
};
use crossbeam_channel::{Receiver, Sender};
use judgehost_api::{EvaluationPlan, Program, TestCase, TestGroup, TestResult};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error, info};

/// Creates the result stream.
///
/// The channel is unbuffered: every send blocks until the consumer receives,
/// so the receiver must be drained concurrently with [`Evaluator::evaluate`].
pub fn result_channel() -> (Sender<TestResult>, Receiver<TestResult>) {
    crossbeam_channel::bounded(0)
}

/// Collaborators used for evaluation
#[derive(Debug, Clone)]
pub struct EvalEnv {
    pub backend: Arc<dyn Backend>,
    pub permissions: Arc<dyn PermissionFixer>,
    pub diff: Arc<dyn DiffEngine>,
    /// Owner group of case staging directories
    pub judge_group_id: Option<u32>,
    pub validator_limits: LimitsConfig,
}

impl EvalEnv {
    pub fn from_config(cfg: &JudgehostConfig) -> EvalEnv {
        let permissions: Arc<dyn PermissionFixer> = match &cfg.fix_permissions {
            Some(program) => Arc::new(CommandPermissionFixer::new(program)),
            None => Arc::new(NoopPermissionFixer),
        };
        let poll_interval = Duration::from_millis(cfg.process_backend.poll_interval_ms);
        EvalEnv {
            backend: Arc::new(ProcessBackend::new(poll_interval)),
            permissions,
            diff: Arc::new(TokenDiff),
            judge_group_id: cfg.judge_group_id,
            validator_limits: cfg.validator_limits,
        }
    }
}

/// Evaluates one plan. Owns the staging areas and, while
/// [`evaluate`](Evaluator::evaluate) runs, both sandboxes.
#[derive(Debug)]
pub struct Evaluator {
    pub(crate) root: PathBuf,
    pub(crate) linker: FileLinker,
    pub(crate) val_linker: Option<FileLinker>,
    pub(crate) plan: EvaluationPlan,
    pub(crate) env: EvalEnv,
    results: Sender<TestResult>,
}

enum Evaluable<'a> {
    Group(&'a TestGroup),
    Case(&'a TestCase),
}

impl Evaluable<'_> {
    fn name(&self) -> &str {
        match self {
            Evaluable::Group(group) => &group.name,
            Evaluable::Case(case) => &case.name,
        }
    }
}

/// State shared by all nodes during one tree walk
pub(crate) struct Session<'a> {
    pub(crate) evaluator: &'a Evaluator,
    pub(crate) program: &'a mut SandboxGuard,
    pub(crate) validator: Option<Validator<'a>>,
}

impl Evaluator {
    pub fn new(
        root: impl Into<PathBuf>,
        plan: EvaluationPlan,
        results: Sender<TestResult>,
        env: EvalEnv,
    ) -> Result<Evaluator, EvalError> {
        let root = root.into();
        let env_dir = root.join("env");
        let linker = FileLinker::new(&env_dir, env.judge_group_id).staging(&env_dir)?;
        let val_linker = match plan.validator {
            Some(_) => {
                let valenv_dir = root.join("valenv");
                Some(FileLinker::new(&valenv_dir, env.judge_group_id).staging(&valenv_dir)?)
            }
            None => None,
        };
        Ok(Evaluator {
            root,
            linker,
            val_linker,
            plan,
            env,
            results,
        })
    }

    /// Runs the submission on every case of the plan.
    ///
    /// Each case and group result is sent to the stream as soon as it is
    /// known. The stream is closed when this returns, whatever the outcome.
    pub fn evaluate(self) -> Result<(), EvalError> {
        info!(root = %self.root.display(), "starting evaluation");
        match self.run() {
            Ok(total) => {
                info!(verdict = %total.verdict, score = total.score, "evaluation finished");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "evaluation failed");
                Err(err)
            }
        }
    }

    fn run(&self) -> Result<TestResult, EvalError> {
        self.reset_permissions()?;
        let mut program_sandbox =
            self.start_sandbox(SandboxRole::Submission, self.submission_args())?;
        let mut validator_sandbox = match (&self.plan.validator, &self.val_linker) {
            (Some(validator), Some(val_linker)) => Some(self.start_sandbox(
                SandboxRole::Validator,
                self.validator_args(validator, val_linker),
            )?),
            _ => None,
        };
        let validator = match (
            validator_sandbox.as_mut(),
            &self.plan.validator,
            &self.val_linker,
        ) {
            (Some(sandbox), Some(program), Some(linker)) => Some(Validator {
                sandbox,
                linker,
                run_command: &program.run_command,
                permissions: &*self.env.permissions,
                permissions_root: self.permissions_root(),
                scoring: self.plan.scoring_validator,
            }),
            _ => None,
        };
        let mut session = Session {
            evaluator: self,
            program: &mut program_sandbox,
            validator,
        };
        session.evaluate_group(&self.plan.root_group)
    }

    fn start_sandbox(
        &self,
        role: SandboxRole,
        args: SandboxArgs,
    ) -> Result<SandboxGuard, EvalError> {
        debug!(%role, ?args, "creating sandbox");
        let sandbox = self
            .env
            .backend
            .new_sandbox(role.id(), args)
            .map_err(|source| EvalError::SandboxCreate { role, source })?;
        SandboxGuard::start(role, sandbox).map_err(|source| EvalError::SandboxStart { role, source })
    }

    fn submission_args(&self) -> SandboxArgs {
        let program = &self.plan.program;
        SandboxArgs {
            working_directory: program.program_root.clone(),
            input_path: self.linker.path_for("input", false),
            output_path: self.linker.path_for("output", true),
            error_path: self.linker.path_for("error", true),
            extra_read_paths: vec![program.program_root.clone()],
            extra_write_paths: Vec::new(),
            time_limit_ms: self.plan.time_limit_ms,
            memory_limit_kb: self.plan.mem_limit_kb,
        }
    }

    fn validator_args(&self, validator: &Program, val_linker: &FileLinker) -> SandboxArgs {
        SandboxArgs {
            working_directory: validator.program_root.clone(),
            input_path: val_linker.path_for("team_output", false),
            output_path: val_linker.path_for("output", true),
            error_path: val_linker.path_for("error", true),
            extra_read_paths: vec![
                val_linker.read_base().to_path_buf(),
                validator.program_root.clone(),
            ],
            extra_write_paths: vec![val_linker.write_base().to_path_buf()],
            time_limit_ms: self.env.validator_limits.time_limit_ms,
            memory_limit_kb: self.env.validator_limits.memory_limit_kb,
        }
    }

    /// Everything sandboxes touch lives below the parent of `root`
    pub(crate) fn permissions_root(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }

    pub(crate) fn reset_permissions(&self) -> Result<(), EvalError> {
        self.env
            .permissions
            .reset(self.permissions_root())
            .map_err(EvalError::ResetPermissions)
    }

    pub(crate) fn publish(&self, result: &TestResult) -> Result<(), EvalError> {
        self.results
            .send(result.clone())
            .map_err(|_| EvalError::StreamClosed)
    }
}

impl Session<'_> {
    pub(crate) fn evaluate_group(&mut self, group: &TestGroup) -> Result<TestResult, EvalError> {
        let mut evaluables: Vec<Evaluable> = group
            .groups
            .iter()
            .map(Evaluable::Group)
            .chain(group.cases.iter().map(Evaluable::Case))
            .collect();
        evaluables.sort_by(|a, b| a.name().cmp(b.name()));

        let mut results = Vec::with_capacity(evaluables.len());
        for evaluable in evaluables {
            let result = match evaluable {
                Evaluable::Group(child) => self.evaluate_group(child)?,
                Evaluable::Case(case) => Judge {
                    req: JudgeRequest { case, group },
                    session: self,
                }
                .judge()?,
            };
            let failed = !result.verdict.is_accepted();
            results.push(result);
            if failed && group.break_on_fail {
                debug!(group = %group.name, "stopping group after failed child");
                break;
            }
        }

        let group_result = merge(&results, group);
        debug!(
            group = %group.name,
            verdict = %group_result.verdict,
            score = group_result.score,
            "group evaluated"
        );
        self.evaluator.publish(&group_result)?;
        Ok(group_result)
    }
}
