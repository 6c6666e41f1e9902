// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::unit::TestOutcome;
use std::{fmt, time::Duration};

/// Statistics for a completed run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests discovered at the beginning of the run.
    ///
    /// If the run is cancelled, this will be more than `finished_count` at the end.
    pub initial_run_count: usize,

    /// The number of tests that were started.
    pub started_count: usize,

    /// The number of tests that finished running and were assessed.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of outcome cache entries written during the run.
    pub cache_writes: usize,

    /// Set if the run was cancelled before every test finished.
    pub cancel_reason: Option<CancelReason>,

    /// The wall-clock time the run took.
    pub elapsed: Duration,
}

impl RunStats {
    /// Returns true if no test failed.
    ///
    /// A cancelled run can still be a success: see [`cancel_reason`](Self::cancel_reason) for
    /// whether every test got to run.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns the number of tests that were never started.
    pub fn not_run_count(&self) -> usize {
        self.initial_run_count.saturating_sub(self.started_count)
    }

    /// Returns the number of tests that were started but left running when the run ended.
    pub fn abandoned_count(&self) -> usize {
        self.started_count.saturating_sub(self.finished_count)
    }

    pub(super) fn on_test_finished(&mut self, outcome: TestOutcome) {
        self.finished_count += 1;
        match outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Skipped => self.skipped += 1,
            TestOutcome::Failed => self.failed += 1,
            // Rejected before stats are updated.
            TestOutcome::Prepared => {}
        }
    }

    /// Records a cancellation. The most severe reason wins.
    pub(super) fn cancel(&mut self, reason: CancelReason) {
        self.cancel_reason = self.cancel_reason.max(Some(reason));
    }
}

// Note: the order here matters -- it indicates severity of cancellation
/// The reason why a run was cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum CancelReason {
    /// A test failed and stop-on-failure was enabled.
    ///
    /// No new tests are started, but running tests are waited on and reported.
    StopOnFailure,

    /// An interrupt was requested, through a signal or the run's
    /// [`InterruptToken`](crate::interrupt::InterruptToken).
    ///
    /// The run ends as soon as this is observed. Running tests are left running.
    Signal,
}

impl CancelReason {
    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            Self::StopOnFailure => "test failure",
            Self::Signal => "interrupt",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn success_is_sticky() {
        let mut stats = RunStats {
            initial_run_count: 3,
            started_count: 3,
            ..Default::default()
        };
        assert!(stats.is_success(), "no tests finished yet");
        stats.on_test_finished(TestOutcome::Passed);
        stats.on_test_finished(TestOutcome::Failed);
        assert!(!stats.is_success());
        stats.on_test_finished(TestOutcome::Passed);
        assert!(!stats.is_success(), "later passes don't restore success");
        assert_eq!((stats.passed, stats.failed, stats.finished_count), (2, 1, 3));
    }

    #[proptest]
    fn most_severe_cancel_reason_wins(a: CancelReason, b: CancelReason) {
        let mut stats = RunStats::default();
        stats.cancel(a);
        stats.cancel(b);
        assert_eq!(stats.cancel_reason, Some(a.max(b)));
    }
}
