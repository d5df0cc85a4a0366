// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::NativeTestConfig,
    errors::{DiscoveryError, DisplayErrorChain, ProcessError},
    helpers::{absolute_path, executable_dir, plural},
    list::{TestCase, TestIdentifier},
    reporter::{MessageLevel, MessageLogger, TestCaseSink},
    signal::CancellationSignal,
    test_command::{ProcessExit, TestCommand},
};
use camino::Utf8Path;

/// Lists the test cases in test executables.
#[derive(Clone, Copy, Debug)]
pub struct TestDiscoverer<'cfg> {
    config: &'cfg NativeTestConfig,
}

/// The result of [`TestDiscoverer::discover_sources`].
#[derive(Debug, Default)]
pub struct DiscoverySummary {
    /// The number of executables that were listed successfully.
    pub sources_listed: usize,

    /// The number of executables skipped because they didn't contain the signature.
    pub sources_skipped: usize,

    /// The total number of test cases sent to the sink.
    pub test_count: usize,

    /// Errors for executables that could not be scanned or listed.
    pub errors: Vec<DiscoveryError>,
}

impl<'cfg> TestDiscoverer<'cfg> {
    /// Creates a new discoverer.
    pub fn new(config: &'cfg NativeTestConfig) -> Self {
        Self { config }
    }

    /// Lists the test cases in `binary` and sends each one to `sink`.
    ///
    /// The executable is run in its own directory with the configured list arguments. Returns the
    /// number of test cases found. If the output can't be parsed, nothing is sent to `sink`.
    pub fn discover(
        &self,
        binary: &Utf8Path,
        logger: &dyn MessageLogger,
        sink: &mut dyn TestCaseSink,
        signal: &CancellationSignal,
    ) -> Result<usize, DiscoveryError> {
        let cases = self.list(binary, logger, signal)?;
        let count = cases.len();
        for case in cases {
            sink.send_test_case(case);
        }
        Ok(count)
    }

    /// Checks every source for the signature, and lists the test cases in the ones that have it.
    ///
    /// Failures are reported to `logger` and collected in the summary; they don't stop the
    /// remaining sources from being listed. Once `signal` is cancelled, no further sources are
    /// started.
    pub fn discover_sources<I>(
        &self,
        sources: I,
        logger: &dyn MessageLogger,
        sink: &mut dyn TestCaseSink,
        signal: &CancellationSignal,
    ) -> DiscoverySummary
    where
        I: IntoIterator,
        I::Item: AsRef<Utf8Path>,
    {
        let mut summary = DiscoverySummary::default();
        for source in sources {
            let source = source.as_ref();
            if signal.is_cancelled() {
                tracing::debug!(%source, "cancelled, not listing remaining sources");
                break;
            }

            match self.config.detector().is_compatible(source) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(%source, "signature not found, skipping");
                    summary.sources_skipped += 1;
                    continue;
                }
                Err(error) => {
                    let error = DiscoveryError::from(error);
                    logger.send_message(
                        MessageLevel::Error,
                        &DisplayErrorChain::new(&error).to_string(),
                    );
                    summary.errors.push(error);
                    continue;
                }
            }

            match self.discover(source, logger, sink, signal) {
                Ok(count) => {
                    summary.sources_listed += 1;
                    summary.test_count += count;
                }
                Err(error) => {
                    logger.send_message(
                        MessageLevel::Error,
                        &DisplayErrorChain::new(&error).to_string(),
                    );
                    summary.errors.push(error);
                }
            }
        }

        tracing::debug!(
            sources_listed = summary.sources_listed,
            sources_skipped = summary.sources_skipped,
            test_count = summary.test_count,
            "listed {} {}",
            summary.sources_listed,
            plural::executables_str(summary.sources_listed),
        );
        summary
    }

    /// Parses the output of the list command.
    ///
    /// The output is either empty or a single line of whitespace-separated `Group.Case` tokens. If
    /// any token is malformed, the whole output is rejected.
    pub fn parse_list_output(
        binary: &Utf8Path,
        output: &str,
    ) -> Result<Vec<TestIdentifier>, DiscoveryError> {
        output
            .split_whitespace()
            .map(|token| {
                token.parse::<TestIdentifier>().map_err(|error| {
                    DiscoveryError::parse_token(binary, error.to_string(), output)
                })
            })
            .collect()
    }

    // ---
    // Helper methods
    // ---

    pub(crate) fn list(
        &self,
        binary: &Utf8Path,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> Result<Vec<TestCase>, DiscoveryError> {
        let program = absolute_path(binary).map_err(|error| DiscoveryError::Process {
            binary: binary.to_owned(),
            error: ProcessError::spawn([binary.as_str()], error),
        })?;

        let mut command = TestCommand::new(
            &program,
            executable_dir(&program),
            self.config.list_args(),
        );
        command
            .envs(self.config.env())
            .poll_interval(self.config.poll_interval());

        let output = command
            .run_captured(signal)
            .map_err(|error| DiscoveryError::Process {
                binary: binary.to_owned(),
                error,
            })?;

        match output.exit {
            ProcessExit::Cancelled => {
                return Err(DiscoveryError::Cancelled {
                    binary: binary.to_owned(),
                });
            }
            ProcessExit::Exited { code: Some(0) } => {}
            ProcessExit::Exited { code } => {
                let code = code.map_or_else(|| "unknown".to_owned(), |code| code.to_string());
                logger.send_message(
                    MessageLevel::Warning,
                    &format!("listing tests in {binary} exited with code {code}"),
                );
            }
        }

        let stdout = String::from_utf8(output.stdout).map_err(|error| DiscoveryError::NonUtf8 {
            binary: binary.to_owned(),
            stdout: error.into_bytes(),
        })?;

        let ids = Self::parse_list_output(binary, &stdout)?;
        if ids.is_empty() {
            logger.send_message(
                MessageLevel::Informational,
                &format!("no tests found in {binary}"),
            );
        } else {
            logger.send_message(
                MessageLevel::Informational,
                &format!(
                    "discovered {} {} in {binary}",
                    ids.len(),
                    plural::tests_str(ids.len())
                ),
            );
        }

        Ok(ids
            .into_iter()
            .map(|id| TestCase::new(id, binary))
            .collect())
    }
}
