// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation for listing and running tests.
//!
//! A [`CancellationSignal`] is passed by reference into every blocking operation. Operations poll it
//! and stop early once it has been cancelled, either explicitly through [`CancellationSignal::cancel`]
//! or by a timeout armed with [`CancellationSignal::cancel_after`]. A single signal may be shared by
//! any number of concurrent operations.

use crate::errors::CancellationError;
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// How often the timeout monitor wakes up.
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A monotonic cancellation flag, optionally triggered by a timeout.
///
/// Once cancelled, a signal stays cancelled. The owner must call [`teardown`](Self::teardown)
/// exactly once after every consumer has observed the final state.
#[derive(Debug, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
    monitor: Mutex<Option<TimeoutMonitor>>,
    torn_down: AtomicBool,
}

impl CancellationSignal {
    /// Creates a new, active signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the signal. Cancelling an already-cancelled signal does nothing.
    pub fn cancel(&self) -> Result<(), CancellationError> {
        self.ensure_live()?;
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
        }
        Ok(())
    }

    /// Cancels the signal once `timeout` has elapsed, unless it is cancelled earlier.
    ///
    /// Any timeout armed by a previous call is stopped first, and its monitor thread joined.
    pub fn cancel_after(&self, timeout: Duration) -> Result<&Self, CancellationError> {
        // Checked under the monitor lock, which teardown also holds while marking the signal.
        let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_live()?;
        if let Some(previous) = monitor.take() {
            previous.stop();
        }
        *monitor = Some(TimeoutMonitor::start(self.cancelled.clone(), timeout));

        Ok(self)
    }

    /// Returns true if the signal has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns [`CancellationError::Cancelled`] if the signal has been cancelled.
    pub fn check(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Stops any running timeout. Further calls to `cancel`, `cancel_after` or `teardown` fail
    /// with [`CancellationError::TornDown`].
    pub fn teardown(&self) -> Result<(), CancellationError> {
        let monitor = {
            let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
            if self.torn_down.swap(true, Ordering::AcqRel) {
                return Err(CancellationError::TornDown);
            }
            monitor.take()
        };
        if let Some(monitor) = monitor {
            monitor.stop();
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), CancellationError> {
        if self.torn_down.load(Ordering::Acquire) {
            Err(CancellationError::TornDown)
        } else {
            Ok(())
        }
    }

    fn stop_monitor(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
    }
}

impl Drop for CancellationSignal {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}

#[derive(Debug)]
struct TimeoutMonitor {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TimeoutMonitor {
    fn start(cancelled: Arc<AtomicBool>, timeout: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            loop {
                if thread_stop.load(Ordering::Acquire) || cancelled.load(Ordering::Acquire) {
                    return;
                }
                if start.elapsed() >= timeout {
                    cancelled.store(true, Ordering::Release);
                    tracing::debug!(?timeout, "timeout elapsed, cancelling");
                    return;
                }
                thread::sleep(MONITOR_POLL_INTERVAL);
            }
        });

        Self { stop, handle }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        // The monitor thread never panics, so the result carries no information.
        _ = self.handle.join();
    }
}
