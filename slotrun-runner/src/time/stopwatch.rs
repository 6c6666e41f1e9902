// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long runs and jobs take.
//!
//! Runs and jobs need to track a start time and a duration. For that we use a combination of a
//! `DateTime` (realtime clock) and an `Instant` (monotonic clock). Elapsed time is always reported
//! using the monotonic clock.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

/// A snapshot of a stopwatch: when it was started, and how much time had passed.
#[derive(Clone, Copy, Debug)]
pub struct StopwatchSnapshot {
    /// The time at which the stopwatch was started.
    pub start_time: DateTime<Local>,

    /// The amount of time elapsed since the start.
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwatch_elapsed() {
        let start = stopwatch();
        std::thread::sleep(Duration::from_millis(50));
        let first = start.snapshot();
        std::thread::sleep(Duration::from_millis(50));
        let second = start.snapshot();

        assert_eq!(first.start_time, second.start_time);
        assert!(
            first.duration >= Duration::from_millis(50),
            "first snapshot ({:?}) is at least 50ms",
            first.duration
        );
        assert!(second.duration > first.duration);
    }
}
