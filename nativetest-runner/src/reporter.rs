// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface between nativetest and the test host.
//!
//! The host implements [`TestRecorder`] to receive per-test events, [`MessageLogger`] to receive
//! human-readable messages, and [`TestCaseSink`] to receive discovered test cases.

use crate::list::TestCase;
use std::{fmt, time::Duration};

/// The outcome of a single test case.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestOutcome {
    /// The test ran and reported no failure.
    Passed,

    /// The test ran and reported a failure.
    Failed,

    /// The test was started but no result was reported for it, for example because the executable
    /// crashed or the run was cancelled.
    Skipped,
}

impl TestOutcome {
    /// Returns true if this outcome is a pass.
    pub fn is_success(self) -> bool {
        match self {
            TestOutcome::Passed => true,
            TestOutcome::Failed | TestOutcome::Skipped => false,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed => f.pad("PASS"),
            TestOutcome::Failed => f.pad("FAIL"),
            TestOutcome::Skipped => f.pad("SKIP"),
        }
    }
}

/// The result of a test case, as read from a report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestResult {
    /// The test case this result is for.
    pub case: TestCase,

    /// The outcome.
    pub outcome: TestOutcome,

    /// For failed tests, a description of the failure.
    pub error_message: Option<String>,

    /// The time taken, if the report included it.
    pub duration: Option<Duration>,
}

/// Receives per-test events during a run.
///
/// For every test case passed to [`record_start`](Self::record_start), exactly one of
/// [`record_result`](Self::record_result) or [`record_end`](Self::record_end) is called later.
pub trait TestRecorder {
    /// Called before the executable containing `case` is started.
    fn record_start(&mut self, case: &TestCase);

    /// Called when `case` finished without a result.
    fn record_end(&mut self, case: &TestCase, outcome: TestOutcome);

    /// Called when a result for a test case was read from a report.
    fn record_result(&mut self, result: &TestResult);
}

/// The severity of a message sent to the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MessageLevel {
    /// An informational message.
    Informational,

    /// A warning.
    Warning,

    /// An error.
    Error,
}

/// Receives human-readable messages.
///
/// Messages may be sent from several threads at once.
pub trait MessageLogger: Send + Sync {
    /// Sends a message to the host.
    fn send_message(&self, level: MessageLevel, message: &str);
}

/// A [`MessageLogger`] that forwards messages to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl MessageLogger for TracingLogger {
    fn send_message(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Informational => tracing::info!(target: "nativetest", "{message}"),
            MessageLevel::Warning => tracing::warn!(target: "nativetest", "{message}"),
            MessageLevel::Error => tracing::error!(target: "nativetest", "{message}"),
        }
    }
}

/// Receives test cases as they are discovered.
///
/// This is implemented for closures, so a `Vec` can be filled with `|case| cases.push(case)`.
pub trait TestCaseSink {
    /// Called once for every discovered test case.
    fn send_test_case(&mut self, case: TestCase);
}

impl<F> TestCaseSink for F
where
    F: FnMut(TestCase),
{
    fn send_test_case(&mut self, case: TestCase) {
        self(case)
    }
}
