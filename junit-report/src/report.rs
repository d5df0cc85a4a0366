// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

/// A single `testcase` row of a JUnit report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Testcase {
    /// The class name of this test case. Test frameworks for C and C++ use this for the test group.
    pub classname: String,

    /// The name of this test case.
    pub name: String,

    /// The source file the test case is defined in, if reported.
    pub file: Option<String>,

    /// The line within `file` the test case is defined at, if reported.
    ///
    /// This is kept as the raw attribute text.
    pub line: Option<String>,

    /// The time taken by this test case, if reported.
    ///
    /// This is read from the number of seconds in the `time` attribute.
    pub time: Option<Duration>,

    /// The failure recorded for this test case, if any.
    pub failure: Option<Failure>,
}

impl Testcase {
    /// Creates a new, passing `Testcase` with the given class name and name.
    pub fn new(classname: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            name: name.into(),
            file: None,
            line: None,
            time: None,
            failure: None,
        }
    }

    /// Sets the source location for this test case.
    pub fn set_location(
        &mut self,
        file: impl Into<String>,
        line: Option<impl Into<String>>,
    ) -> &mut Self {
        self.file = Some(file.into());
        self.line = line.map(Into::into);
        self
    }

    /// Sets the time taken by this test case.
    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = Some(time);
        self
    }

    /// Marks this test case as failed.
    pub fn set_failure(&mut self, failure: Failure) -> &mut Self {
        self.failure = Some(failure);
        self
    }

    /// Returns true if this test case has no recorded failure.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A `failure` element nested inside a [`Testcase`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Failure {
    /// The `message` attribute.
    pub message: Option<String>,

    /// The `type` attribute.
    pub ty: Option<String>,

    /// The text content of the element.
    pub description: Option<String>,
}

impl Failure {
    /// Creates a new `Failure` with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure message.
    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the failure type.
    pub fn set_type(&mut self, ty: impl Into<String>) -> &mut Self {
        self.ty = Some(ty.into());
        self
    }

    /// Sets the text description.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }
}
