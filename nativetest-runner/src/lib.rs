// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for running tests inside precompiled native test executables, such as
//! CppUTest binaries, on behalf of a test host.
//!
//! The basic flow is:
//! 1. [`signature::SignatureDetector`] decides whether a file is a compatible test executable.
//! 2. [`list::TestDiscoverer`] runs it to list the test cases it contains.
//! 3. [`runner::TestRunner`] runs it again to produce JUnit reports, and reconciles the reports
//!    against the listed cases.
//!
//! Every blocking operation takes a [`signal::CancellationSignal`], and the host receives events
//! through the traits in [`reporter`].

pub mod config;
pub mod errors;
mod helpers;
pub mod list;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod signature;
pub mod test_command;
