//! Ownership reset of shared judging files.
//!
//! Sandboxed programs and the judge service write the same files under
//! different effective users, so the tree is periodically handed back to the
//! judge by a privileged helper.
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FixPermissionsError {
    #[error("failed to start {}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} exited with {status}", program.display())]
    Failed { program: PathBuf, status: ExitStatus },
}

pub trait PermissionFixer: Debug + Send + Sync {
    fn reset(&self, path: &Path) -> Result<(), FixPermissionsError>;
}

/// Runs `<program> --path <path>`, usually a setuid helper.
#[derive(Debug, Clone)]
pub struct CommandPermissionFixer {
    program: PathBuf,
}

impl CommandPermissionFixer {
    pub fn new(program: impl Into<PathBuf>) -> CommandPermissionFixer {
        CommandPermissionFixer {
            program: program.into(),
        }
    }
}

impl PermissionFixer for CommandPermissionFixer {
    fn reset(&self, path: &Path) -> Result<(), FixPermissionsError> {
        debug!(path = %path.display(), "resetting permissions");
        let status = Command::new(&self.program)
            .arg("--path")
            .arg(path)
            .status()
            .map_err(|source| FixPermissionsError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(FixPermissionsError::Failed {
                program: self.program.clone(),
                status,
            })
        }
    }
}

/// For hosts where sandboxed programs run as the judge user.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPermissionFixer;

impl PermissionFixer for NoopPermissionFixer {
    fn reset(&self, _path: &Path) -> Result<(), FixPermissionsError> {
        Ok(())
    }
}
