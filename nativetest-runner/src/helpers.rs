// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for nativetest-runner.

use camino::{Utf8Path, Utf8PathBuf};
use std::io;

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "executable" if `count` is 1, otherwise "executables".
    pub(crate) fn executables_str(count: usize) -> &'static str {
        if count == 1 {
            "executable"
        } else {
            "executables"
        }
    }
}

/// Used when a failure in a report has no message.
pub(crate) const DEFAULT_FAILURE_MESSAGE: &str = "No failure message was reported.";

/// Builds the message shown to the host for a failed test case.
///
/// The message is prefixed with the failure location, if the report included one.
pub(crate) fn failure_message(
    file: Option<&str>,
    line: Option<&str>,
    message: Option<&str>,
) -> String {
    let message = message.unwrap_or(DEFAULT_FAILURE_MESSAGE);
    match (file, line) {
        (Some(file), Some(line)) => format!("At line {line} of {file}\n\n{message}"),
        (Some(file), None) => format!("In {file}\n\n{message}"),
        (None, _) => message.to_owned(),
    }
}

/// Makes `path` absolute against the current directory, without touching the filesystem.
pub(crate) fn absolute_path(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let absolute = std::path::absolute(path)?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|path| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("absolute path `{}` is not valid UTF-8", path.display()),
        )
    })
}

/// Returns the directory an executable is run in: the directory containing it.
pub(crate) fn executable_dir(absolute: &Utf8Path) -> &Utf8Path {
    absolute.parent().unwrap_or(absolute)
}
