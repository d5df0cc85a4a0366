// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::tempdir;
use color_eyre::eyre::{Result, ensure};
use nativetest_runner::{
    config::NativeTestConfig,
    errors::ExecuteError,
    reporter::{MessageLevel, TestOutcome},
    runner::{RunStats, TestRunnerBuilder},
    signal::CancellationSignal,
    test_command::DebuggerLauncher,
};
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeMap,
    io,
    process::{Command, Stdio},
    sync::Mutex,
    time::{Duration, Instant},
};

const VALENTINE_FAILURE: &str = "At line 23 of /src/NativeTestExe/ExampleTests.cpp\n\n\
                                 expected <steve>\n\tbut was  <harvey>";

fn config_in(dir: &Utf8Path, contents: &str) -> Result<NativeTestConfig> {
    let config_file = dir.join("nativetest.toml");
    std::fs::write(&config_file, contents)?;
    Ok(NativeTestConfig::from_sources(dir, Some(&config_file))?)
}

fn passed(id: &str) -> Event {
    Event::Result {
        id: id.to_owned(),
        outcome: TestOutcome::Passed,
        message: None,
    }
}

fn failed(id: &str, message: &str) -> Event {
    Event::Result {
        id: id.to_owned(),
        outcome: TestOutcome::Failed,
        message: Some(message.to_owned()),
    }
}

fn skipped(id: &str) -> Event {
    Event::End(id.to_owned(), TestOutcome::Skipped)
}

#[test]
fn run_valentine() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = config_in(
        dir.path(),
        &format!("work-dir-parent = \"{}\"", dir.path().join("work")),
    )?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(VALENTINE);
    let cases = [
        "MyFunnyValentine_testGroup.test_PassingTest1",
        "MyFunnyValentine_testGroup.test_PassingTest2",
        "MyFunnyValentine_testGroup.test_FailingTest1",
    ]
    .map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let stats = runner.run_source(&source, &cases, &mut host, &logger, &signal)?;

    // Every start comes before any result.
    assert_eq!(
        host.events[..3],
        [
            Event::Start("MyFunnyValentine_testGroup.test_PassingTest1".to_owned()),
            Event::Start("MyFunnyValentine_testGroup.test_PassingTest2".to_owned()),
            Event::Start("MyFunnyValentine_testGroup.test_FailingTest1".to_owned()),
        ]
    );
    assert_eq!(
        host.finishes(),
        vec![
            &passed("MyFunnyValentine_testGroup.test_PassingTest1"),
            &passed("MyFunnyValentine_testGroup.test_PassingTest2"),
            &failed(
                "MyFunnyValentine_testGroup.test_FailingTest1",
                VALENTINE_FAILURE
            ),
        ]
    );
    assert_eq!(
        stats,
        RunStats {
            initial_run_count: 3,
            finished_count: 3,
            passed: 2,
            failed: 1,
            skipped: 0,
        }
    );

    // The working directory is removed after the run.
    let leftover: Vec<_> = dir.path().join("work").read_dir_utf8()?.collect();
    ensure!(leftover.is_empty(), "work dir was cleaned up: {leftover:?}");

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_crash_skips_unreported() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(PARTIAL);
    let cases = ["Crashy.first", "Crashy.second"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let stats = runner.run_source(&source, &cases, &mut host, &logger, &signal)?;

    assert_eq!(host.starts(), vec!["Crashy.first", "Crashy.second"]);
    assert_eq!(
        host.finishes(),
        vec![&passed("Crashy.first"), &skipped("Crashy.second")]
    );
    assert_eq!(stats.skipped, 1);
    ensure!(!stats.is_success(), "skipped tests fail the run");

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_unknown_case_is_an_error() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(UNKNOWN_CASE);
    let cases = ["Known.one", "Known.two"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let error = runner
        .run_source(&source, &cases, &mut host, &logger, &signal)
        .expect_err("unknown case is an error");
    match &error {
        ExecuteError::UnknownTestCase {
            binary, identifier, ..
        } => {
            assert_eq!(binary, &source);
            assert_eq!(identifier.to_string(), "Surprise.extra");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Reconciliation stopped at the unknown row, and the rest were swept up as skipped.
    assert_eq!(
        host.finishes(),
        vec![&passed("Known.one"), &skipped("Known.two")]
    );

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_multiple_reports() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(MULTI_REPORT);
    let cases = ["Beta.b", "Alpha.a", "Alpha.dup"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    runner.run_source(&source, &cases, &mut host, &logger, &signal)?;

    // Reports are read in file name order, and the repeated row in the second report is ignored.
    assert_eq!(
        host.finishes(),
        vec![
            &passed("Alpha.a"),
            &passed("Alpha.dup"),
            &failed("Beta.b", "In beta.cpp\n\nNo failure message was reported."),
        ]
    );
    let warnings = logger.at_level(MessageLevel::Warning);
    assert_eq!(warnings.len(), 1);
    ensure!(warnings[0].contains("Alpha.dup"), "warning names the case");

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_malformed_report() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(MALFORMED_REPORT);
    let cases = ["Broken.before", "Broken.after"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    runner.run_source(&source, &cases, &mut host, &logger, &signal)?;

    assert_eq!(
        host.finishes(),
        vec![&passed("Broken.before"), &skipped("Broken.after")]
    );
    let errors = logger.at_level(MessageLevel::Error);
    assert_eq!(errors.len(), 1);
    ensure!(
        errors[0].contains("cpputest_Broken.xml"),
        "error names the report: {}",
        errors[0]
    );

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_sources_end_to_end() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let summary = runner.run_sources(
        [
            fixture_path(NOT_A_TEST),
            fixture_path(MALFORMED_LIST),
            fixture_path(EMPTY),
            fixture_path(VALENTINE),
        ],
        &mut host,
        &logger,
        &signal,
    );

    assert_eq!(summary.errors.len(), 1, "malformed list is reported");
    assert_eq!(
        summary.stats,
        RunStats {
            initial_run_count: 3,
            finished_count: 3,
            passed: 2,
            failed: 1,
            skipped: 0,
        }
    );
    assert_eq!(host.starts().len(), 3);
    ensure!(!summary.is_success(), "errors and failures fail the batch");

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_timeout_cancels_and_stops_batch() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = config_in(dir.path(), "run-timeout = \"200ms\"\npoll-interval = \"5ms\"")?;
    let runner = TestRunnerBuilder::default().build(&config);
    let sleeper = fixture_path(SLEEPER);
    let valentine = fixture_path(VALENTINE);
    let cases = vec![
        test_case(&sleeper, "Slow.test"),
        test_case(&valentine, "MyFunnyValentine_testGroup.test_PassingTest1"),
    ];
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let start = Instant::now();
    let summary = runner.run_tests(cases, &mut host, &logger, &signal);
    ensure!(
        start.elapsed() < Duration::from_secs(30),
        "the sleeping executable was killed"
    );
    ensure!(signal.is_cancelled(), "the run timeout fired");

    // The later source was never started.
    assert_eq!(
        host.events,
        vec![Event::Start("Slow.test".to_owned()), skipped("Slow.test")]
    );
    ensure!(summary.errors.is_empty(), "cancellation is not an error");
    assert_eq!(
        summary.stats,
        RunStats {
            initial_run_count: 2,
            finished_count: 1,
            passed: 0,
            failed: 0,
            skipped: 1,
        }
    );

    signal.teardown()?;
    Ok(())
}

#[test]
fn cancel_keeps_finished_reports() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = config_in(dir.path(), "poll-interval = \"5ms\"")?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(HALF_DONE);
    let cases = ["A.done", "B.pending"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();
    signal.cancel_after(Duration::from_millis(500))?;

    let start = Instant::now();
    let stats = runner.run_source(&source, &cases, &mut host, &logger, &signal)?;
    ensure!(
        start.elapsed() < Duration::from_secs(30),
        "the hanging executable was killed"
    );
    ensure!(signal.is_cancelled(), "the timeout fired");

    // The group that finished before the kill keeps its result.
    assert_eq!(
        host.finishes(),
        vec![&passed("A.done"), &skipped("B.pending")]
    );
    assert_eq!(
        stats,
        RunStats {
            initial_run_count: 2,
            finished_count: 2,
            passed: 1,
            failed: 0,
            skipped: 1,
        }
    );
    assert_eq!(
        logger.at_level(MessageLevel::Informational),
        vec![format!("run of {source} was cancelled")]
    );

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_tests_drops_duplicate_cases() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(PARTIAL);
    let cases = vec![
        test_case(&source, "Crashy.second"),
        test_case(&source, "Crashy.first"),
        test_case(&source, "Crashy.second"),
    ];
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let summary = runner.run_tests(cases, &mut host, &logger, &signal);

    // One start and one terminal event per distinct case.
    assert_eq!(host.starts(), vec!["Crashy.second", "Crashy.first"]);
    assert_eq!(
        host.finishes(),
        vec![&passed("Crashy.first"), &skipped("Crashy.second")]
    );
    assert_eq!(
        summary.stats,
        RunStats {
            initial_run_count: 2,
            finished_count: 2,
            passed: 1,
            failed: 0,
            skipped: 1,
        }
    );
    let warnings = logger.at_level(MessageLevel::Warning);
    assert_eq!(warnings.len(), 1);
    ensure!(
        warnings[0].contains("Crashy.second"),
        "warning names the case: {}",
        warnings[0]
    );

    signal.teardown()?;
    Ok(())
}

#[test]
fn run_source_drops_duplicate_cases() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(PARTIAL);
    let cases = ["Crashy.first", "Crashy.first"].map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let stats = runner.run_source(&source, &cases, &mut host, &logger, &signal)?;

    assert_eq!(host.starts(), vec!["Crashy.first"]);
    assert_eq!(host.finishes(), vec![&passed("Crashy.first")]);
    ensure!(stats.is_success(), "the single case passed: {stats:?}");

    signal.teardown()?;
    Ok(())
}

#[test]
fn work_dir_removal_failure_is_reported() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let runner = TestRunnerBuilder::default().build(&config);
    let source = fixture_path(VANISHING);
    let cases = [test_case(&source, "Gone.test")];
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let error = runner
        .run_source(&source, &cases, &mut host, &logger, &signal)
        .expect_err("the report directory is gone");
    ensure!(
        matches!(error, ExecuteError::ReadReportDir { .. }),
        "unexpected error: {error:?}"
    );
    assert_eq!(host.finishes(), vec![&skipped("Gone.test")]);

    let warnings = logger.at_level(MessageLevel::Warning);
    assert_eq!(warnings.len(), 1);
    ensure!(
        warnings[0].contains("failed to remove working directory"),
        "host is told about the leftover directory: {}",
        warnings[0]
    );

    signal.teardown()?;
    Ok(())
}

/// Starts executables as children of the test process and hands back their pids, like a debugger
/// hosted in-process would.
#[derive(Debug, Default)]
struct FakeDebugger {
    launched: Mutex<Vec<(Utf8PathBuf, Utf8PathBuf, Vec<String>)>>,
}

impl DebuggerLauncher for FakeDebugger {
    fn launch(
        &self,
        file_path: &Utf8Path,
        working_dir: &Utf8Path,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> io::Result<u32> {
        self.launched.lock().expect("lock is not poisoned").push((
            file_path.to_owned(),
            working_dir.to_owned(),
            args.to_vec(),
        ));
        // The child is reaped by the runner once it attaches.
        let child = Command::new(file_path)
            .args(args)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;
        Ok(child.id())
    }
}

#[test]
fn run_under_debugger() -> Result<()> {
    test_init();

    let dir = tempdir()?;
    let config = NativeTestConfig::from_sources(dir.path(), None)?;
    let debugger = FakeDebugger::default();
    let mut builder = TestRunnerBuilder::default();
    builder.set_debugger(&debugger);
    let runner = builder.build(&config);
    let source = fixture_path(VALENTINE);
    let cases = [
        "MyFunnyValentine_testGroup.test_PassingTest1",
        "MyFunnyValentine_testGroup.test_PassingTest2",
        "MyFunnyValentine_testGroup.test_FailingTest1",
    ]
    .map(|id| test_case(&source, id));
    let mut host = RecordingHost::default();
    let logger = MessageLog::default();
    let signal = CancellationSignal::new();

    let stats = runner.run_source(&source, &cases, &mut host, &logger, &signal)?;
    assert_eq!(stats.passed, 2);
    assert_eq!(stats.failed, 1);

    let launched = debugger.launched.lock().expect("lock is not poisoned");
    assert_eq!(launched.len(), 1);
    let (file_path, working_dir, args) = &launched[0];
    assert_eq!(file_path, &source);
    assert_eq!(args, &vec!["-ojunit".to_owned()]);
    ensure!(
        working_dir
            .file_name()
            .is_some_and(|name| name.starts_with("nativetest-")),
        "ran in a fresh working directory: {working_dir}"
    );

    signal.teardown()?;
    Ok(())
}
