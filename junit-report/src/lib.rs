// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read JUnit reports produced by native test executables.
//!
//! Reports are read as a stream of [`Testcase`] rows: the enclosing `testsuites` and `testsuite`
//! elements are accepted but otherwise ignored, since a test executable may shard its results across
//! several documents and only the per-case rows matter to consumers.

mod deserialize;
mod errors;
mod report;

pub use deserialize::*;
pub use errors::*;
pub use report::*;
