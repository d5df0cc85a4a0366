// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running tests and reconciling their reports.
//!
//! Tests are run one executable at a time. Each executable is run once, with every requested test
//! case in it, inside a fresh working directory. The reports it writes there are then matched up
//! against the requested test cases. Cases without a result in any report are reported as skipped.

use crate::{
    config::NativeTestConfig,
    errors::{DiscoveryError, DisplayErrorChain, ExecuteError},
    helpers::{self, absolute_path, plural},
    list::{TestCase, TestDiscoverer, TestIdentifier},
    reporter::{MessageLevel, MessageLogger, TestOutcome, TestRecorder, TestResult},
    signal::CancellationSignal,
    test_command::{DebuggerLauncher, ProcessExit, TestCommand},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::{Builder, Utf8TempDir};
use debug_ignore::DebugIgnore;
use indexmap::{IndexMap, IndexSet};
use junit_report::Testcase;
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufReader},
};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder<'a> {
    debugger: Option<DebugIgnore<&'a dyn DebuggerLauncher>>,
}

impl<'a> TestRunnerBuilder<'a> {
    /// Runs test executables through the given debugger launcher rather than spawning them
    /// directly.
    pub fn set_debugger(&mut self, debugger: &'a dyn DebuggerLauncher) -> &mut Self {
        self.debugger = Some(DebugIgnore(debugger));
        self
    }

    /// Creates a new test runner.
    pub fn build(self, config: &'a NativeTestConfig) -> TestRunner<'a> {
        TestRunner {
            config,
            debugger: self.debugger,
        }
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Clone, Debug)]
pub struct TestRunner<'a> {
    config: &'a NativeTestConfig,
    debugger: Option<DebugIgnore<&'a dyn DebuggerLauncher>>,
}

impl<'a> TestRunner<'a> {
    /// Runs the given test cases, grouped by the executable they belong to.
    ///
    /// Executables are run in the order they first appear in `cases`. A case listed more than once
    /// is run once, with a warning. A failure in one executable is reported to `logger` and
    /// collected in the summary, and the remaining executables still run. Once `signal` is
    /// cancelled, no further executables are started.
    ///
    /// If a run timeout is configured, it is armed on `signal` first.
    pub fn run_tests(
        &self,
        cases: impl IntoIterator<Item = TestCase>,
        recorder: &mut dyn TestRecorder,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> RunSummary {
        self.arm_run_timeout(signal);

        let mut by_source: IndexMap<Utf8PathBuf, IndexSet<TestCase>> = IndexMap::new();
        for case in cases {
            let source_cases = by_source.entry(case.source.clone()).or_default();
            if let Some(case) = source_cases.replace(case) {
                warn_duplicate(&case, logger);
            }
        }

        let mut summary = RunSummary::default();
        summary.stats.initial_run_count = by_source.values().map(IndexSet::len).sum();
        for (source, cases) in &by_source {
            if signal.is_cancelled() {
                tracing::debug!(%source, "cancelled, not running remaining sources");
                break;
            }
            let cases: Vec<_> = cases.iter().collect();
            self.run_source_into(source, &cases, recorder, logger, signal, &mut summary);
        }

        summary
    }

    /// Lists the tests in each compatible source, then runs them.
    ///
    /// Sources without the signature are skipped. Listing and running failures are reported to
    /// `logger` and collected in the summary. Once `signal` is cancelled, no further sources are
    /// listed or run.
    ///
    /// If a run timeout is configured, it is armed on `signal` first.
    pub fn run_sources<I>(
        &self,
        sources: I,
        recorder: &mut dyn TestRecorder,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> RunSummary
    where
        I: IntoIterator,
        I::Item: AsRef<Utf8Path>,
    {
        self.arm_run_timeout(signal);

        let discoverer = TestDiscoverer::new(self.config);
        let mut summary = RunSummary::default();
        for source in sources {
            let source = source.as_ref();
            if signal.is_cancelled() {
                tracing::debug!(%source, "cancelled, not running remaining sources");
                break;
            }

            match self.config.detector().is_compatible(source) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(%source, "signature not found, skipping");
                    continue;
                }
                Err(error) => {
                    summary.push_error(ExecuteError::Discovery(error.into()), logger);
                    continue;
                }
            }

            let cases = match discoverer.list(source, logger, signal) {
                Ok(cases) => cases,
                Err(DiscoveryError::Cancelled { .. }) => {
                    tracing::debug!(%source, "cancelled while listing tests");
                    break;
                }
                Err(error) => {
                    summary.push_error(error.into(), logger);
                    continue;
                }
            };
            if cases.is_empty() {
                continue;
            }

            let cases = unique_cases(&cases, logger);
            summary.stats.initial_run_count += cases.len();
            self.run_source_into(source, &cases, recorder, logger, signal, &mut summary);
        }

        summary
    }

    /// Runs the given test cases from a single executable.
    ///
    /// Every distinct case in `cases` is passed to [`TestRecorder::record_start`] before the
    /// executable is started, and receives exactly one result or skipped notification afterwards,
    /// including when an error is returned. Repeated cases are dropped with a warning.
    pub fn run_source(
        &self,
        source: &Utf8Path,
        cases: &[TestCase],
        recorder: &mut dyn TestRecorder,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> Result<RunStats, ExecuteError> {
        let cases = unique_cases(cases, logger);
        let mut recorder = CountingRecorder::new(recorder);
        recorder.stats.initial_run_count = cases.len();
        self.execute_source(source, &cases, &mut recorder, logger, signal)?;
        Ok(recorder.stats)
    }

    // ---
    // Helper methods
    // ---

    fn arm_run_timeout(&self, signal: &CancellationSignal) {
        if let Some(timeout) = self.config.run_timeout() {
            if let Err(error) = signal.cancel_after(timeout) {
                tracing::warn!(?timeout, "could not arm run timeout: {error}");
            }
        }
    }

    fn run_source_into(
        &self,
        source: &Utf8Path,
        cases: &[&TestCase],
        recorder: &mut dyn TestRecorder,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
        summary: &mut RunSummary,
    ) {
        let mut recorder = CountingRecorder::new(recorder);
        let res = self.execute_source(source, cases, &mut recorder, logger, signal);
        summary.stats.add(recorder.stats);
        if let Err(error) = res {
            summary.push_error(error, logger);
        }
    }

    fn execute_source(
        &self,
        source: &Utf8Path,
        cases: &[&TestCase],
        recorder: &mut CountingRecorder<'_>,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> Result<(), ExecuteError> {
        for case in cases {
            recorder.record_start(case);
        }

        let mut reconciler = Reconciler::new(source, cases);
        let res = self.run_in_work_dir(
            source,
            cases.len(),
            &mut reconciler,
            recorder,
            logger,
            signal,
        );

        // Whatever happened, every started case must end.
        for case in reconciler.pending.values() {
            recorder.record_end(case, TestOutcome::Skipped);
        }

        res
    }

    fn run_in_work_dir(
        &self,
        source: &Utf8Path,
        case_count: usize,
        reconciler: &mut Reconciler<'_>,
        recorder: &mut CountingRecorder<'_>,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> Result<(), ExecuteError> {
        let program = absolute_path(source).map_err(|error| ExecuteError::ResolvePath {
            binary: source.to_owned(),
            error,
        })?;
        let work_dir = self
            .create_work_dir()
            .map_err(|error| ExecuteError::CreateWorkDir {
                binary: source.to_owned(),
                error,
            })?;
        tracing::debug!(
            %source,
            work_dir = %work_dir.path(),
            "running {case_count} {}",
            plural::tests_str(case_count),
        );

        let res = self.run_and_reconcile(
            &program,
            source,
            work_dir.path(),
            reconciler,
            recorder,
            logger,
            signal,
        );

        let work_dir_path = work_dir.path().to_owned();
        if let Err(error) = work_dir.close() {
            tracing::warn!(
                work_dir = %work_dir_path,
                "failed to remove working directory: {error}"
            );
            logger.send_message(
                MessageLevel::Warning,
                &format!(
                    "for {source}, failed to remove working directory {work_dir_path}: {error}"
                ),
            );
        }

        res
    }

    #[expect(clippy::too_many_arguments)]
    fn run_and_reconcile(
        &self,
        program: &Utf8Path,
        source: &Utf8Path,
        work_dir: &Utf8Path,
        reconciler: &mut Reconciler<'_>,
        recorder: &mut CountingRecorder<'_>,
        logger: &dyn MessageLogger,
        signal: &CancellationSignal,
    ) -> Result<(), ExecuteError> {
        let mut command = TestCommand::new(program, work_dir, self.config.report_args());
        command
            .envs(self.config.env())
            .poll_interval(self.config.poll_interval());

        let debugger = self.debugger.as_ref().map(|debugger| debugger.0);
        let exit = command
            .run(debugger, signal)
            .map_err(|error| ExecuteError::Process {
                binary: source.to_owned(),
                error,
            })?;
        // A killed executable may still have written reports for the groups it finished.
        match exit {
            ProcessExit::Cancelled => {
                logger.send_message(
                    MessageLevel::Informational,
                    &format!("run of {source} was cancelled"),
                );
            }
            ProcessExit::Exited { code } => {
                // Test executables exit non-zero when tests fail, so this isn't an error.
                tracing::debug!(%source, ?code, "test executable exited");
            }
        }

        for report in self.collect_reports(source, work_dir)? {
            let file = File::open(&report).map_err(|error| ExecuteError::OpenReport {
                binary: source.to_owned(),
                path: report.clone(),
                error,
            })?;

            for row in junit_report::read_testcases(BufReader::new(file)) {
                match row {
                    Ok(row) => reconciler.reconcile(row, &report, recorder, logger)?,
                    Err(error) => {
                        logger.send_message(
                            MessageLevel::Error,
                            &format!(
                                "for {source}, failed to read report {report}: {}",
                                DisplayErrorChain::new(&error)
                            ),
                        );
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn create_work_dir(&self) -> io::Result<Utf8TempDir> {
        let mut builder = Builder::new();
        builder.prefix(self.config.work_dir_prefix());
        match self.config.work_dir_parent() {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }

    /// Returns report files in `work_dir`, sorted by name.
    fn collect_reports(
        &self,
        source: &Utf8Path,
        work_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, ExecuteError> {
        let read_dir_error = |error| ExecuteError::ReadReportDir {
            binary: source.to_owned(),
            dir: work_dir.to_owned(),
            error,
        };

        let mut reports = Vec::new();
        for entry in work_dir.read_dir_utf8().map_err(read_dir_error)? {
            let entry = entry.map_err(read_dir_error)?;
            let is_file = entry.file_type().map_err(read_dir_error)?.is_file();
            if is_file && entry.path().extension() == Some(self.config.report_extension()) {
                reports.push(entry.into_path());
            }
        }
        reports.sort_unstable();

        tracing::debug!(%source, count = reports.len(), "found reports");
        Ok(reports)
    }
}

/// Returns `cases` with repeats removed, keeping the first occurrence of each.
fn unique_cases<'c>(cases: &'c [TestCase], logger: &dyn MessageLogger) -> Vec<&'c TestCase> {
    let mut seen = HashSet::with_capacity(cases.len());
    cases
        .iter()
        .filter(|&case| {
            let first = seen.insert(case);
            if !first {
                warn_duplicate(case, logger);
            }
            first
        })
        .collect()
}

fn warn_duplicate(case: &TestCase, logger: &dyn MessageLogger) {
    logger.send_message(
        MessageLevel::Warning,
        &format!(
            "for {}, ignoring duplicate request for {}",
            case.source, case.id
        ),
    );
}

/// Matches report rows to the test cases requested for one executable.
#[derive(Debug)]
struct Reconciler<'a> {
    source: &'a Utf8Path,
    requested: HashSet<&'a TestIdentifier>,
    pending: IndexMap<&'a TestIdentifier, &'a TestCase>,
}

impl<'a> Reconciler<'a> {
    fn new(source: &'a Utf8Path, cases: &[&'a TestCase]) -> Self {
        Self {
            source,
            requested: cases.iter().map(|&case| &case.id).collect(),
            pending: cases.iter().map(|&case| (&case.id, case)).collect(),
        }
    }

    fn reconcile(
        &mut self,
        row: Testcase,
        report: &Utf8Path,
        recorder: &mut CountingRecorder<'_>,
        logger: &dyn MessageLogger,
    ) -> Result<(), ExecuteError> {
        let id = TestIdentifier::new(row.classname.as_str(), row.name.as_str());
        let Some(case) = self.pending.shift_remove(&id) else {
            if self.requested.contains(&id) {
                logger.send_message(
                    MessageLevel::Warning,
                    &format!(
                        "for {}, ignoring repeated result for {id} in {report}",
                        self.source
                    ),
                );
                return Ok(());
            }
            return Err(ExecuteError::UnknownTestCase {
                binary: self.source.to_owned(),
                report: report.to_owned(),
                identifier: id,
            });
        };

        let (outcome, error_message) = match &row.failure {
            None => (TestOutcome::Passed, None),
            Some(failure) => (
                TestOutcome::Failed,
                Some(helpers::failure_message(
                    row.file.as_deref(),
                    row.line.as_deref(),
                    failure.message.as_deref(),
                )),
            ),
        };
        recorder.record_result(&TestResult {
            case: case.clone(),
            outcome,
            error_message,
            duration: row.time,
        });
        Ok(())
    }
}

/// Wraps a [`TestRecorder`], counting outcomes.
struct CountingRecorder<'r> {
    inner: &'r mut dyn TestRecorder,
    stats: RunStats,
}

impl<'r> CountingRecorder<'r> {
    fn new(inner: &'r mut dyn TestRecorder) -> Self {
        Self {
            inner,
            stats: RunStats::default(),
        }
    }

    fn count(&mut self, outcome: TestOutcome) {
        self.stats.finished_count += 1;
        match outcome {
            TestOutcome::Passed => self.stats.passed += 1,
            TestOutcome::Failed => self.stats.failed += 1,
            TestOutcome::Skipped => self.stats.skipped += 1,
        }
    }
}

impl TestRecorder for CountingRecorder<'_> {
    fn record_start(&mut self, case: &TestCase) {
        self.inner.record_start(case);
    }

    fn record_end(&mut self, case: &TestCase, outcome: TestOutcome) {
        self.count(outcome);
        self.inner.record_end(case, outcome);
    }

    fn record_result(&mut self, result: &TestResult) {
        self.count(result.outcome);
        self.inner.record_result(result);
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// If the run is cancelled before every executable was started, this will be more than
    /// `finished_count` at the end.
    pub initial_run_count: usize,

    /// The number of tests that received a result or were skipped.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were started but had no result in any report.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was cancelled before every executable was started
    /// * any tests failed
    /// * any tests were skipped
    pub fn is_success(&self) -> bool {
        self.initial_run_count == self.finished_count && self.failed == 0 && self.skipped == 0
    }

    fn add(&mut self, other: RunStats) {
        self.initial_run_count += other.initial_run_count;
        self.finished_count += other.finished_count;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// The result of running a batch of executables.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Counts of test outcomes across the batch.
    pub stats: RunStats,

    /// Errors for executables that could not be listed or run.
    pub errors: Vec<ExecuteError>,
}

impl RunSummary {
    /// Returns true if every test passed and no errors occurred.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.stats.is_success()
    }

    fn push_error(&mut self, error: ExecuteError, logger: &dyn MessageLogger) {
        logger.send_message(
            MessageLevel::Error,
            &DisplayErrorChain::new(&error).to_string(),
        );
        self.errors.push(error);
    }
}
