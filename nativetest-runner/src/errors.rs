// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by nativetest.

use crate::list::TestIdentifier;
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{borrow::Cow, error::Error, fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse nativetest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The signature detector settings are invalid.
    #[error("invalid signature settings")]
    InvalidDetector(#[source] DetectorBuildError),

    /// The poll interval was zero.
    #[error("poll-interval must be greater than zero")]
    ZeroPollInterval,
}

/// An error that occurs while building a [`SignatureDetector`](crate::signature::SignatureDetector).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DetectorBuildError {
    /// The signature was empty.
    #[error("signature must not be empty")]
    EmptySignature,

    /// The read chunk size was zero.
    #[error("read-chunk-size must be greater than zero")]
    ZeroChunkSize,

    /// The matcher could not be built.
    #[error("failed to build signature matcher")]
    Matcher(#[source] aho_corasick::BuildError),
}

/// An error that occurs while scanning a file for a signature.
#[derive(Debug, Error)]
#[error("failed to scan `{path}` for the test framework signature")]
pub struct SignatureScanError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl SignatureScanError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    /// Returns the path that could not be scanned.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// An error returned by a [`CancellationSignal`](crate::signal::CancellationSignal).
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum CancellationError {
    /// The signal was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The signal was modified after it was torn down.
    #[error("cancellation signal used after teardown")]
    TornDown,
}

/// An error that occurs while starting or monitoring a process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    /// Spawning the process failed.
    #[error("running command `{}` failed", shell_words::join(command))]
    Spawn {
        /// The command that was run.
        command: Vec<String>,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The debugger launcher failed to start the process.
    #[error("debugger failed to launch `{}`", shell_words::join(command))]
    DebuggerLaunch {
        /// The command that was passed to the debugger launcher.
        command: Vec<String>,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A process started by the debugger launcher could not be attached to.
    #[error("failed to attach to process {pid} started by the debugger")]
    Attach {
        /// The process ID returned by the debugger launcher.
        pid: u32,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Checking on the process failed.
    #[error("failed to wait for process {pid}")]
    Wait {
        /// The process ID.
        pid: u32,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Reading standard output from the process failed.
    #[error("failed to read output of process {pid}")]
    ReadOutput {
        /// The process ID.
        pid: u32,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

impl ProcessError {
    pub(crate) fn spawn(
        command: impl IntoIterator<Item = impl Into<String>>,
        error: io::Error,
    ) -> Self {
        Self::Spawn {
            command: command.into_iter().map(|s| s.into()).collect(),
            error,
        }
    }

    pub(crate) fn debugger_launch(
        command: impl IntoIterator<Item = impl Into<String>>,
        error: io::Error,
    ) -> Self {
        Self::DebuggerLaunch {
            command: command.into_iter().map(|s| s.into()).collect(),
            error,
        }
    }
}

/// An error that occurs while parsing a [`TestIdentifier`] from a `Group.Case` token.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("test name `{token}` {reason}")]
pub struct ParseIdentifierError {
    token: String,
    reason: &'static str,
}

impl ParseIdentifierError {
    pub(crate) fn new(token: impl Into<String>, reason: &'static str) -> Self {
        Self {
            token: token.into(),
            reason,
        }
    }

    /// Returns the token that failed to parse.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// An error that occurs while listing the tests in a test executable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The executable could not be scanned for the signature.
    #[error(transparent)]
    Scan(#[from] SignatureScanError),

    /// The executable could not be run.
    #[error("listing tests in `{binary}` failed")]
    Process {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: ProcessError,
    },

    /// Listing was cancelled before the executable exited.
    #[error("listing tests in `{binary}` was cancelled")]
    Cancelled {
        /// The test executable.
        binary: Utf8PathBuf,
    },

    /// The executable printed output that wasn't valid UTF-8.
    #[error("for `{binary}`, test list output was not valid UTF-8")]
    NonUtf8 {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The raw output.
        stdout: Vec<u8>,
    },

    /// A token in the test list could not be parsed.
    #[error("for `{binary}`, {message}\nfull output:\n{full_output}")]
    ParseToken {
        /// The test executable.
        binary: Utf8PathBuf,

        /// A descriptive message.
        message: Cow<'static, str>,

        /// The full output.
        full_output: String,
    },
}

impl DiscoveryError {
    pub(crate) fn parse_token(
        binary: impl Into<Utf8PathBuf>,
        message: impl Into<Cow<'static, str>>,
        full_output: impl Into<String>,
    ) -> Self {
        Self::ParseToken {
            binary: binary.into(),
            message: message.into(),
            full_output: full_output.into(),
        }
    }
}

/// An error that occurs while running the tests in a test executable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecuteError {
    /// Listing the tests failed, for runs that list tests first.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The scratch directory for the run could not be created.
    #[error("for `{binary}`, failed to create a working directory")]
    CreateWorkDir {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The executable path could not be made absolute.
    #[error("failed to resolve the absolute path of `{binary}`")]
    ResolvePath {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The executable could not be run.
    #[error("running tests in `{binary}` failed")]
    Process {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: ProcessError,
    },

    /// The working directory could not be listed for reports.
    #[error("for `{binary}`, failed to read report directory `{dir}`")]
    ReadReportDir {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The directory that was read.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A report could not be opened.
    #[error("for `{binary}`, failed to open report `{path}`")]
    OpenReport {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A report named a test case that was not requested.
    #[error("for `{binary}`, report `{report}` contains test `{identifier}`, which was not requested")]
    UnknownTestCase {
        /// The test executable.
        binary: Utf8PathBuf,

        /// The report that named the test case.
        report: Utf8PathBuf,

        /// The identifier read from the report.
        identifier: TestIdentifier,
    },
}

/// Displays an error along with the chain of errors that caused it.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain` wrapping `error`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\ncaused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }

        Ok(())
    }
}
