// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while reading a JUnit report.
///
/// Returned by [`TestcaseReader`](crate::TestcaseReader) as it iterates over a document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The underlying XML was malformed, or reading from the source failed.
    #[error("error reading JUnit XML at byte {position}")]
    Xml {
        /// The byte offset at which the error was detected.
        position: usize,

        /// The underlying error.
        #[source]
        inner: quick_xml::Error,
    },

    /// A `testcase` element was missing a required attribute.
    #[error("testcase element ending at byte {position} is missing the `{attribute}` attribute")]
    MissingAttribute {
        /// The byte offset just past the element.
        position: usize,

        /// The name of the missing attribute.
        attribute: &'static str,
    },

    /// The document ended while a `testcase` element was still open.
    #[error("report ended inside testcase `{classname}.{name}`")]
    UnexpectedEof {
        /// The class name of the unterminated test case.
        classname: String,

        /// The name of the unterminated test case.
        name: String,
    },
}
