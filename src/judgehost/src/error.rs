use crate::{
    diff::DiffFlagError, permissions::FixPermissionsError, sandbox::SandboxError,
    sandbox::SandboxRole,
};
use std::{io, num::ParseFloatError, path::PathBuf};

/// Infrastructure or configuration fault which aborts the whole evaluation.
///
/// Contestant-visible outcomes are never reported this way; they are
/// [`Verdict`](judgehost_api::Verdict)s in the result stream.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("could not reset permissions")]
    ResetPermissions(#[source] FixPermissionsError),
    #[error("failed creating {role} sandbox")]
    SandboxCreate {
        role: SandboxRole,
        #[source]
        source: SandboxError,
    },
    #[error("failed starting {role} sandbox")]
    SandboxStart {
        role: SandboxRole,
        #[source]
        source: SandboxError,
    },
    #[error("{role} sandbox failed to run command")]
    SandboxRun {
        role: SandboxRole,
        #[source]
        source: SandboxError,
    },
    #[error("output validator timed out")]
    ValidatorTimedOut,
    #[error("output validator crashed: {0}")]
    ValidatorCrashed(String),
    #[error("could not read crashed output validator {what}")]
    ValidatorReport {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("could not read score from scoring validator")]
    MissingScore(#[source] io::Error),
    #[error("could not parse score {raw:?} from scoring validator")]
    BadScore {
        raw: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("invalid output validator flags")]
    DiffFlags(#[from] DiffFlagError),
    #[error("failed to compare output")]
    Diff(#[source] io::Error),
    #[error("failed to stage {}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("result consumer disconnected")]
    StreamClosed,
}

pub(crate) trait StagingContext<T> {
    fn staging(self, path: impl Into<PathBuf>) -> Result<T, EvalError>;
}

impl<T> StagingContext<T> for io::Result<T> {
    fn staging(self, path: impl Into<PathBuf>) -> Result<T, EvalError> {
        self.map_err(|source| EvalError::Staging {
            path: path.into(),
            source,
        })
    }
}
