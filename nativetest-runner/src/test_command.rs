// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running test executables and waiting for them to exit.
//!
//! A [`TestCommand`] describes one invocation of a test executable. Processes are started either
//! directly or through a [`DebuggerLauncher`] supplied by the host; either way the result is the
//! same kind of process handle, so waiting and killing behave identically.
//!
//! Waiting is done by polling: every poll interval, the process is checked for exit and the
//! [`CancellationSignal`] is checked for cancellation. A cancelled process is killed.

use crate::{errors::ProcessError, signal::CancellationSignal};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::BTreeMap,
    io::{self, Read},
    process::{Child, ChildStdout, Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};

#[cfg(unix)]
#[path = "test_command/unix.rs"]
mod os;

#[cfg(windows)]
#[path = "test_command/windows.rs"]
mod os;

/// Launches test executables under a debugger.
///
/// Implemented by the host. The launched process must already be running when `launch` returns;
/// nativetest attaches to it by process ID and then waits on and kills it like any other process.
pub trait DebuggerLauncher: Send + Sync {
    /// Starts `file_path` with `args` in `working_dir` under a debugger, and returns its process
    /// ID.
    fn launch(
        &self,
        file_path: &Utf8Path,
        working_dir: &Utf8Path,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> io::Result<u32>;
}

/// How a process finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessExit {
    /// The process exited on its own.
    Exited {
        /// The exit code, if the platform reported one. This is `None` if the process was
        /// terminated by a signal, or if it was started by a debugger and its exit code is not
        /// available.
        code: Option<i32>,
    },

    /// The cancellation signal fired first, and the process was killed.
    Cancelled,
}

impl ProcessExit {
    /// Returns true if the process exited on its own with a zero exit code.
    pub fn is_success(self) -> bool {
        matches!(self, ProcessExit::Exited { code: Some(0) })
    }
}

/// The result of [`TestCommand::run_captured`].
#[derive(Clone, Debug)]
pub struct CapturedOutput {
    /// How the process finished.
    pub exit: ProcessExit,

    /// Everything the process wrote to standard output. Empty if the run was cancelled.
    pub stdout: Vec<u8>,
}

/// A to-be-run invocation of a test executable.
#[derive(Clone, Debug)]
pub struct TestCommand {
    program: Utf8PathBuf,
    cwd: Utf8PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    poll_interval: Duration,
}

impl TestCommand {
    /// The default interval between checks on a running process.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Creates a new command that runs `program` with `args`, in the directory `cwd`.
    pub fn new(
        program: impl Into<Utf8PathBuf>,
        cwd: impl Into<Utf8PathBuf>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Adds environment variables for the process.
    pub fn envs(&mut self, env: &BTreeMap<String, String>) -> &mut Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Sets how often the process and the cancellation signal are checked.
    pub fn poll_interval(&mut self, poll_interval: Duration) -> &mut Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the program that will be run.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Returns the working directory for the process.
    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    /// Returns the arguments passed to the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the command and blocks until it exits or `signal` is cancelled.
    ///
    /// If `debugger` is provided, the process is started through it. Otherwise it is spawned
    /// directly, with standard input closed and output discarded. On cancellation the process is
    /// killed; failures to kill are ignored.
    pub fn run(
        &self,
        debugger: Option<&dyn DebuggerLauncher>,
        signal: &CancellationSignal,
    ) -> Result<ProcessExit, ProcessError> {
        match debugger {
            Some(launcher) => self.run_with(&DebuggerAttach { launcher }, signal),
            None => self.run_with(&DirectLauncher, signal),
        }
    }

    /// Runs the command, collecting its standard output.
    ///
    /// Standard output is read on a separate thread while this thread waits for the process, since
    /// a process blocked on a full pipe would otherwise never exit. If `signal` is cancelled, the
    /// process is killed and the reader thread is left to finish on its own.
    pub fn run_captured(
        &self,
        signal: &CancellationSignal,
    ) -> Result<CapturedOutput, ProcessError> {
        let mut cmd = self.std_command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|error| ProcessError::spawn(self.argv(), error))?;
        let drain = child.stdout.take().map(spawn_drain);
        let mut handle = ProcessHandle::from_child(child);
        let pid = handle.pid;

        let exit = self.wait(&mut handle, signal)?;
        let cancelled = CapturedOutput {
            exit: ProcessExit::Cancelled,
            stdout: Vec::new(),
        };
        if exit == ProcessExit::Cancelled {
            return Ok(cancelled);
        }

        let Some(drain) = drain else {
            return Ok(CapturedOutput {
                exit,
                stdout: Vec::new(),
            });
        };
        // A grandchild may still hold the pipe open, so keep honoring the signal.
        while !drain.is_finished() {
            if signal.is_cancelled() {
                tracing::debug!(pid, "cancelled while reading output, abandoning reader");
                return Ok(cancelled);
            }
            thread::sleep(self.poll_interval);
        }
        let stdout = drain
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("output reader thread panicked")))
            .map_err(|error| ProcessError::ReadOutput { pid, error })?;

        Ok(CapturedOutput { exit, stdout })
    }

    // ---
    // Helper methods
    // ---

    fn run_with(
        &self,
        launcher: &dyn ProcessLauncher,
        signal: &CancellationSignal,
    ) -> Result<ProcessExit, ProcessError> {
        let mut handle = launcher.launch(self)?;
        self.wait(&mut handle, signal)
    }

    fn wait(
        &self,
        handle: &mut ProcessHandle,
        signal: &CancellationSignal,
    ) -> Result<ProcessExit, ProcessError> {
        let pid = handle.pid;
        loop {
            match handle.try_wait() {
                Ok(Some(code)) => {
                    tracing::debug!(pid, ?code, program = %self.program, "process exited");
                    return Ok(ProcessExit::Exited { code });
                }
                Ok(None) => {}
                Err(error) => {
                    handle.kill();
                    return Err(ProcessError::Wait { pid, error });
                }
            }

            if signal.is_cancelled() {
                tracing::debug!(pid, program = %self.program, "cancelled, killing process");
                handle.kill();
                return Ok(ProcessExit::Cancelled);
            }

            thread::sleep(self.poll_interval);
        }
    }

    fn std_command(&self) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .envs(&self.env)
            // Test executables must never wait for input.
            .stdin(Stdio::null());
        os::set_process_group(&mut cmd);
        cmd
    }

    fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

fn spawn_drain(mut stdout: ChildStdout) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

/// Starts a process for a [`TestCommand`].
trait ProcessLauncher {
    fn launch(&self, command: &TestCommand) -> Result<ProcessHandle, ProcessError>;
}

/// Spawns the process as a child of this one.
struct DirectLauncher;

impl ProcessLauncher for DirectLauncher {
    fn launch(&self, command: &TestCommand) -> Result<ProcessHandle, ProcessError> {
        let mut cmd = command.std_command();
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let child = cmd
            .spawn()
            .map_err(|error| ProcessError::spawn(command.argv(), error))?;
        Ok(ProcessHandle::from_child(child))
    }
}

/// Has the host's debugger start the process, then attaches to it.
struct DebuggerAttach<'a> {
    launcher: &'a dyn DebuggerLauncher,
}

impl ProcessLauncher for DebuggerAttach<'_> {
    fn launch(&self, command: &TestCommand) -> Result<ProcessHandle, ProcessError> {
        let pid = self
            .launcher
            .launch(&command.program, &command.cwd, &command.args, &command.env)
            .map_err(|error| ProcessError::debugger_launch(command.argv(), error))?;
        tracing::debug!(
            pid,
            program = %command.program,
            "attaching to process started by debugger"
        );
        ProcessHandle::attach(pid).map_err(|error| ProcessError::Attach { pid, error })
    }
}

/// A running process, either spawned by us or attached to by ID.
///
/// Dropping the handle releases any operating system resources held for the process.
#[derive(Debug)]
struct ProcessHandle {
    pid: u32,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Child(Child),
    Attached(os::AttachedProcess),
}

impl ProcessHandle {
    fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            inner: HandleInner::Child(child),
        }
    }

    /// Attaches to the process with the given ID. The process is opened immediately, so a process
    /// that can't be found is reported here rather than on a later wait.
    fn attach(pid: u32) -> io::Result<Self> {
        Ok(Self {
            pid,
            inner: HandleInner::Attached(os::AttachedProcess::attach(pid)?),
        })
    }

    /// Returns `Some(exit code)` if the process has exited.
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        match &mut self.inner {
            HandleInner::Child(child) => Ok(child.try_wait()?.map(|status| status.code())),
            HandleInner::Attached(process) => process.try_wait(),
        }
    }

    /// Kills the process, ignoring errors.
    fn kill(&mut self) {
        match &mut self.inner {
            HandleInner::Child(child) => os::kill_child(child),
            HandleInner::Attached(process) => process.kill(),
        }
    }
}
