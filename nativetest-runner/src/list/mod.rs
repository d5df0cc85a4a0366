// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for listing the test cases contained in test executables.
//!
//! The main data structures in this module are:
//! * [`TestCase`] and [`TestIdentifier`] for individual tests
//! * [`TestDiscoverer`] for running executables to list their tests

mod test_case;
mod test_list;

pub use test_case::*;
pub use test_list::*;
