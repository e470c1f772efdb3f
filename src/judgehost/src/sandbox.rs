//! Execution sandbox contract and a process-based backend.
//!
//! A [`Backend`] creates one [`Sandbox`] per role. A sandbox is started once,
//! runs any number of commands and is finished once. Commands always read
//! stdin from `input_path` and write to `output_path`/`error_path`; callers
//! change what a run sees by relinking files behind those paths.
use std::{
    fmt::Debug,
    fs,
    os::unix::process::{CommandExt, ExitStatusExt},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};
use strum_macros::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SandboxRole {
    Submission,
    Validator,
}

impl SandboxRole {
    pub fn id(self) -> u32 {
        match self {
            SandboxRole::Submission => 0,
            SandboxRole::Validator => 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SandboxArgs {
    pub working_directory: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub error_path: PathBuf,
    pub extra_read_paths: Vec<PathBuf>,
    pub extra_write_paths: Vec<PathBuf>,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub termination: Termination,
    pub time_usage_ms: u64,
}

impl ExecResult {
    /// Non-zero exit or death by signal
    pub fn crashed(&self) -> bool {
        match self.termination {
            Termination::Exited(code) => code != 0,
            Termination::Signaled(_) => true,
            Termination::TimedOut => false,
        }
    }

    pub fn crashed_with(&self, code: i32) -> bool {
        self.termination == Termination::Exited(code)
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox was not started")]
    NotStarted,
    #[error("empty command")]
    EmptyCommand,
    #[error("working directory {} does not exist", .0.display())]
    MissingWorkDir(PathBuf),
    #[error("failed to open {}", path.display())]
    Stdio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for child")]
    Wait(#[source] std::io::Error),
    #[error("{0}")]
    Backend(String),
}

/// Creates sandboxes. Implementations decide how isolation is achieved.
pub trait Backend: Debug + Send + Sync {
    fn new_sandbox(&self, id: u32, args: SandboxArgs) -> Result<Box<dyn Sandbox>, SandboxError>;
}

pub trait Sandbox: Debug + Send {
    fn start(&mut self) -> Result<(), SandboxError>;
    fn run(&mut self, argv: &[String]) -> Result<ExecResult, SandboxError>;
    fn finish(&mut self);
}

/// Finishes the wrapped sandbox when dropped.
#[derive(Debug)]
pub(crate) struct SandboxGuard {
    role: SandboxRole,
    inner: Box<dyn Sandbox>,
}

impl SandboxGuard {
    pub(crate) fn start(
        role: SandboxRole,
        mut inner: Box<dyn Sandbox>,
    ) -> Result<SandboxGuard, SandboxError> {
        inner.start()?;
        debug!(%role, "sandbox started");
        Ok(SandboxGuard { role, inner })
    }

    pub(crate) fn role(&self) -> SandboxRole {
        self.role
    }

    pub(crate) fn run(&mut self, argv: &[String]) -> Result<ExecResult, SandboxError> {
        self.inner.run(argv)
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        self.inner.finish();
        debug!(role = %self.role, "sandbox finished");
    }
}

/// Runs commands as plain child processes of the judgehost.
///
/// There is no filesystem or namespace isolation: extra read/write paths are
/// accepted and ignored. Time is limited by wall clock (the process group is
/// killed on expiry), memory by `RLIMIT_AS`. Only suitable for development
/// and trusted programs.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    poll_interval: Duration,
}

impl ProcessBackend {
    pub fn new(poll_interval: Duration) -> ProcessBackend {
        ProcessBackend { poll_interval }
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        ProcessBackend::new(Duration::from_millis(5))
    }
}

impl Backend for ProcessBackend {
    fn new_sandbox(&self, id: u32, args: SandboxArgs) -> Result<Box<dyn Sandbox>, SandboxError> {
        if !args.extra_read_paths.is_empty() || !args.extra_write_paths.is_empty() {
            debug!(
                id,
                "process sandbox does not restrict filesystem access; extra paths ignored"
            );
        }
        Ok(Box::new(ProcessSandbox {
            id,
            args,
            poll_interval: self.poll_interval,
            started: false,
        }))
    }
}

#[derive(Debug)]
struct ProcessSandbox {
    id: u32,
    args: SandboxArgs,
    poll_interval: Duration,
    started: bool,
}

fn open_stdio(path: &PathBuf, writable: bool) -> Result<fs::File, SandboxError> {
    let file = if writable {
        fs::File::create(path)
    } else {
        fs::File::open(path)
    };
    file.map_err(|source| SandboxError::Stdio {
        path: path.clone(),
        source,
    })
}

fn termination_of(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(sig)) => Termination::Signaled(sig),
        (None, None) => Termination::Signaled(0),
    }
}

fn kill_group(child: &mut Child) {
    let pgid = nix::unistd::Pid::from_raw(child.id() as i32);
    if let Err(err) = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL) {
        warn!(error = %err, "killpg failed, killing leader only");
        child.kill().ok();
    }
}

impl ProcessSandbox {
    fn limit_resources(cmd: &mut Command, time_limit_ms: u64, memory_limit_kb: u64) {
        let cpu_secs = (time_limit_ms + 999) / 1000 + 1;
        let memory_bytes = memory_limit_kb.saturating_mul(1024);
        // Safety: only async-signal-safe libc calls are made between fork and exec
        unsafe {
            cmd.pre_exec(move || {
                let cpu = libc::rlimit {
                    rlim_cur: cpu_secs as libc::rlim_t,
                    rlim_max: cpu_secs as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if memory_bytes > 0 {
                    let mem = libc::rlimit {
                        rlim_cur: memory_bytes as libc::rlim_t,
                        rlim_max: memory_bytes as libc::rlim_t,
                    };
                    if libc::setrlimit(libc::RLIMIT_AS, &mem) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }
    }
}

impl Sandbox for ProcessSandbox {
    fn start(&mut self) -> Result<(), SandboxError> {
        if !self.args.working_directory.is_dir() {
            return Err(SandboxError::MissingWorkDir(
                self.args.working_directory.clone(),
            ));
        }
        self.started = true;
        Ok(())
    }

    fn run(&mut self, argv: &[String]) -> Result<ExecResult, SandboxError> {
        if !self.started {
            return Err(SandboxError::NotStarted);
        }
        let (program, args) = argv.split_first().ok_or(SandboxError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.args.working_directory)
            .stdin(Stdio::from(open_stdio(&self.args.input_path, false)?))
            .stdout(Stdio::from(open_stdio(&self.args.output_path, true)?))
            .stderr(Stdio::from(open_stdio(&self.args.error_path, true)?))
            .process_group(0);
        Self::limit_resources(&mut cmd, self.args.time_limit_ms, self.args.memory_limit_kb);

        debug!(id = self.id, command = ?argv, "executing command");
        let begin = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            command: program.clone(),
            source,
        })?;
        let time_limit = Duration::from_millis(self.args.time_limit_ms);
        let termination = loop {
            if let Some(status) = child.try_wait().map_err(SandboxError::Wait)? {
                break termination_of(status);
            }
            if begin.elapsed() > time_limit {
                kill_group(&mut child);
                child.wait().map_err(SandboxError::Wait)?;
                break Termination::TimedOut;
            }
            std::thread::sleep(self.poll_interval);
        };
        let time_usage_ms = begin.elapsed().as_millis() as u64;
        debug!(id = self.id, ?termination, time_usage_ms, "command finished");
        Ok(ExecResult {
            termination,
            time_usage_ms,
        })
    }

    fn finish(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(termination: Termination) -> ExecResult {
        ExecResult {
            termination,
            time_usage_ms: 0,
        }
    }

    #[test]
    fn classification() {
        assert!(!exec(Termination::Exited(0)).crashed());
        assert!(exec(Termination::Exited(1)).crashed());
        assert!(exec(Termination::Signaled(11)).crashed());
        assert!(!exec(Termination::TimedOut).crashed());
        assert!(exec(Termination::TimedOut).timed_out());
        assert!(exec(Termination::Exited(42)).crashed_with(42));
        assert!(!exec(Termination::Exited(43)).crashed_with(42));
        assert!(!exec(Termination::Signaled(42)).crashed_with(42));
    }

    #[test]
    fn run_requires_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sandbox = ProcessBackend::default()
            .new_sandbox(
                0,
                SandboxArgs {
                    working_directory: dir.path().to_path_buf(),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = sandbox.run(&["/bin/true".to_string()]).unwrap_err();
        assert!(matches!(err, SandboxError::NotStarted));
    }

    #[test]
    fn start_fails_without_workdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sandbox = ProcessBackend::default()
            .new_sandbox(
                0,
                SandboxArgs {
                    working_directory: dir.path().join("missing"),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            sandbox.start(),
            Err(SandboxError::MissingWorkDir(_))
        ));
    }

    #[test]
    fn redirects_stdio() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in");
        std::fs::write(&input, "ping\n").unwrap();
        let args = SandboxArgs {
            working_directory: dir.path().to_path_buf(),
            input_path: input,
            output_path: dir.path().join("out"),
            error_path: dir.path().join("err"),
            time_limit_ms: 5000,
            memory_limit_kb: 1024 * 1024,
            ..Default::default()
        };
        let mut sandbox = ProcessBackend::default().new_sandbox(0, args).unwrap();
        sandbox.start().unwrap();
        let res = sandbox.run(&["/bin/cat".to_string()]).unwrap();
        sandbox.finish();
        assert_eq!(res.termination, Termination::Exited(0));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out")).unwrap(),
            "ping\n"
        );
    }
}
