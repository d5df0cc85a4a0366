// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ParseIdentifierError;
use camino::Utf8PathBuf;
use std::{fmt, str::FromStr};

/// The name of a test case within a test executable: a group and a case name.
///
/// Identifiers are unique within a single executable, and are displayed and parsed as
/// `Group.Case`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TestIdentifier {
    group: String,
    name: String,
}

impl TestIdentifier {
    /// Creates a new identifier from a group and a case name.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Returns the group this test belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the name of this test within its group.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl FromStr for TestIdentifier {
    type Err = ParseIdentifierError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(name), None) => {
                if group.is_empty() || name.is_empty() {
                    Err(ParseIdentifierError::new(token, "has an empty group or name"))
                } else {
                    Ok(Self::new(group, name))
                }
            }
            (None, _, _) | (_, None, _) => Err(ParseIdentifierError::new(
                token,
                "does not separate group and name with '.'",
            )),
            (_, Some(_), Some(_)) => Err(ParseIdentifierError::new(
                token,
                "contains more than one '.'",
            )),
        }
    }
}

/// A test case inside a particular test executable.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TestCase {
    /// The name of the test case.
    pub id: TestIdentifier,

    /// The test executable containing this test case.
    pub source: Utf8PathBuf,
}

impl TestCase {
    /// Creates a new test case.
    pub fn new(id: TestIdentifier, source: impl Into<Utf8PathBuf>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.id)
    }
}
