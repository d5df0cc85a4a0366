// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recognizing compatible test executables by their contents.
//!
//! Test executables are opaque: the only reliable way to tell whether one was built against the
//! expected test framework is to look for a marker string the framework links into every binary.
//! The marker may appear at any offset, so files are scanned as a stream of chunks.

use crate::errors::{DetectorBuildError, SignatureScanError};
use aho_corasick::AhoCorasick;
use camino::Utf8Path;
use std::{
    fs::File,
    io::{self, Read},
};

/// Scans files for a fixed byte signature.
#[derive(Clone, Debug)]
pub struct SignatureDetector {
    signature: Vec<u8>,
    chunk_size: usize,
    matcher: AhoCorasick,
}

impl SignatureDetector {
    /// The default signature: the name of the test framework.
    pub const DEFAULT_SIGNATURE: &'static str = "CppUTest";

    /// The default size of each read.
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    /// Creates a new detector for `signature`, reading files `chunk_size` bytes at a time.
    pub fn new(
        signature: impl Into<Vec<u8>>,
        chunk_size: usize,
    ) -> Result<Self, DetectorBuildError> {
        let signature = signature.into();
        if signature.is_empty() {
            return Err(DetectorBuildError::EmptySignature);
        }
        if chunk_size == 0 {
            return Err(DetectorBuildError::ZeroChunkSize);
        }
        let matcher = AhoCorasick::new([&signature]).map_err(DetectorBuildError::Matcher)?;

        Ok(Self {
            signature,
            chunk_size,
            matcher,
        })
    }

    /// Returns the signature this detector looks for.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the number of bytes read at a time.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns true if the file at `path` contains the signature.
    ///
    /// This only reads the file, so it is safe to call concurrently on the same path.
    pub fn is_compatible(&self, path: &Utf8Path) -> Result<bool, SignatureScanError> {
        let file = File::open(path).map_err(|error| SignatureScanError::new(path, error))?;
        let found = self
            .scan(file)
            .map_err(|error| SignatureScanError::new(path, error))?;
        tracing::debug!(path = %path, found, "scanned for test framework signature");
        Ok(found)
    }

    /// Returns true if the signature occurs anywhere in `reader`.
    ///
    /// The last `signature.len() - 1` bytes of each chunk are carried over to the front of the buffer
    /// before the next read, so a signature straddling two chunks is still found.
    pub fn scan(&self, mut reader: impl Read) -> io::Result<bool> {
        let overlap = self.signature.len() - 1;
        let mut buf = vec![0u8; overlap + self.chunk_size];
        // The number of bytes carried over from the previous chunk.
        let mut carried = 0;

        loop {
            let read = match reader.read(&mut buf[carried..carried + self.chunk_size]) {
                Ok(0) => return Ok(false),
                Ok(read) => read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            };

            let filled = carried + read;
            if self.matcher.is_match(&buf[..filled]) {
                return Ok(true);
            }

            let keep = overlap.min(filled);
            buf.copy_within(filled - keep..filled, 0);
            carried = keep;
        }
    }
}
