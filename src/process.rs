// src/process.rs

//! External tool execution
//!
//! Every external collaborator (apt-get, dpkg, dpkg-buildpackage,
//! dpkg-gensymbols, configure scripts, make, binutils) is driven through
//! [`ToolRunner`]. The system implementation nulls stdin, bounds the run
//! time with `wait-timeout`, and either captures output or streams it into
//! the build log.

use crate::error::{Error, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default bound for short tool invocations
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    /// Append stdout and stderr here instead of capturing them
    pub log_file: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
            log_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        for (k, v) in vars {
            self.env.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn log_to(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Human readable command line, used in logs and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into `Error::CommandFailed`
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let reason = match self.stderr.trim() {
            "" => format!("exit code {}", self.code.unwrap_or(-1)),
            stderr => stderr.lines().last().unwrap_or(stderr).to_string(),
        };
        Err(Error::CommandFailed {
            tool: invocation.display(),
            reason,
        })
    }
}

/// Runs external commands
pub trait ToolRunner: Send + Sync {
    /// Run to completion. `Err` only for spawn failures and timeouts;
    /// a non-zero exit is reported through `ToolOutput::code`.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Run and require a zero exit status
    fn run_checked(&self, invocation: &Invocation) -> Result<ToolOutput> {
        self.run(invocation)?.check(invocation)
    }
}

/// Runs commands on the host system
#[derive(Debug, Clone)]
pub struct SystemRunner {
    default_timeout: Duration,
}

impl SystemRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

/// SIGKILL the whole process group led by `child`, then reap it
fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!("killpg {} failed: {}", pgid, e);
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = source {
            let _ = reader.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let timeout = invocation.timeout.unwrap_or(self.default_timeout);
        debug!("Running: {}", invocation.display());

        let mut cmd = Command::new(&invocation.program);
        // own process group, so a timeout reaches every descendant
        cmd.args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .process_group(0);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        match &invocation.log_file {
            Some(path) => {
                let log = File::options().create(true).append(true).open(path).map_err(|e| {
                    Error::IoError(format!("Failed to open log {}: {}", path.display(), e))
                })?;
                cmd.stdout(Stdio::from(log.try_clone()?))
                    .stderr(Stdio::from(log));
            }
            None => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound(invocation.program.clone())
            } else {
                Error::CommandFailed {
                    tool: invocation.display(),
                    reason: format!("failed to spawn: {}", e),
                }
            }
        })?;

        // Pipes are drained concurrently so a chatty tool cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                warn!(
                    "{} exceeded {}s, killing it",
                    invocation.display(),
                    timeout.as_secs()
                );
                kill_group(&mut child);
                let _ = stdout.join();
                let _ = stderr.join();
                return Err(Error::TimeoutError {
                    tool: invocation.display(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        Ok(ToolOutput {
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

/// Check whether `program` is on `PATH`
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}
