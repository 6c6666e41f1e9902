// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observers of a run.
//!
//! Every run delivers four kinds of notifications, in order, to each registered [`OutputSink`]:
//!
//! 1. [`begin`](OutputSink::begin), once, before any test is discovered or started.
//! 2. [`prepare`](OutputSink::prepare), once per test, as discovery registers it.
//! 3. [`finish`](OutputSink::finish), once per assessed test, in completion order.
//! 4. [`end`](OutputSink::end), once, after scheduling stops.
//!
//! Sinks are notified in registration order. A sink returning an error aborts the run.

mod displayer;
mod junit;

pub use displayer::*;
pub use junit::*;

use crate::{
    errors::SinkError,
    job::{JobOutput, RunMode, SlotId},
    runner::RunStats,
    time::StopwatchSnapshot,
    unit::{Test, TestOutcome},
};
use chrono::{DateTime, Local};
use quick_junit::ReportUuid;

/// An observer of run and test lifecycle events.
pub trait OutputSink {
    /// Called once when a run begins.
    fn begin(&mut self, info: &RunInfo) -> Result<(), SinkError>;

    /// Called once for every test, when it is registered by discovery.
    fn prepare(&mut self, test: &Test) -> Result<(), SinkError>;

    /// Called once for every test that finished and was assessed.
    fn finish(&mut self, finished: &FinishedTest<'_>) -> Result<(), SinkError>;

    /// Called once when a run ends, including runs that were cancelled.
    fn end(&mut self, stats: &RunStats) -> Result<(), SinkError>;
}

/// Information about a run, available when it begins.
#[derive(Clone, Copy, Debug)]
pub struct RunInfo {
    /// A unique identifier for this run.
    pub run_id: ReportUuid,

    /// The number of slots tests are run in.
    pub slot_count: usize,

    /// The time at which the run began.
    pub start_time: DateTime<Local>,
}

/// A test that finished running, with its terminal outcome.
#[derive(Clone, Copy, Debug)]
pub struct FinishedTest<'a> {
    /// The test.
    pub test: &'a Test,

    /// The terminal outcome. Never [`TestOutcome::Prepared`].
    pub outcome: TestOutcome,

    /// The slot the test ran in.
    pub slot: SlotId,

    /// Whether the test was started synchronously or asynchronously.
    pub mode: RunMode,

    /// When the test was dispatched, and how long it took until it was observed to be done.
    pub time_taken: StopwatchSnapshot,

    /// Output captured from the test.
    pub output: &'a JobOutput,

    /// A short description of how the test ended, if the job provided one.
    pub detail: Option<&'a str>,
}

/// The registered sinks for a run, notified in registration order.
#[derive(Default)]
pub struct SinkList<'a> {
    sinks: Vec<Box<dyn OutputSink + 'a>>,
}

impl<'a> SinkList<'a> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink. It will be notified after every sink registered before it.
    pub fn push(&mut self, sink: impl OutputSink + 'a) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Returns the number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if no sinks are registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for SinkList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkList")
            .field("len", &self.sinks.len())
            .finish()
    }
}

impl OutputSink for SinkList<'_> {
    fn begin(&mut self, info: &RunInfo) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|sink| sink.begin(info))
    }

    fn prepare(&mut self, test: &Test) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|sink| sink.prepare(test))
    }

    fn finish(&mut self, finished: &FinishedTest<'_>) -> Result<(), SinkError> {
        self.sinks
            .iter_mut()
            .try_for_each(|sink| sink.finish(finished))
    }

    fn end(&mut self, stats: &RunStats) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|sink| sink.end(stats))
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn begin(&mut self, info: &RunInfo) -> Result<(), SinkError> {
        (**self).begin(info)
    }

    fn prepare(&mut self, test: &Test) -> Result<(), SinkError> {
        (**self).prepare(test)
    }

    fn finish(&mut self, finished: &FinishedTest<'_>) -> Result<(), SinkError> {
        (**self).finish(finished)
    }

    fn end(&mut self, stats: &RunStats) -> Result<(), SinkError> {
        (**self).end(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::TestSignature;
    use std::{cell::RefCell, rc::Rc};

    struct Named {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl OutputSink for Named {
        fn begin(&mut self, _info: &RunInfo) -> Result<(), SinkError> {
            self.log.borrow_mut().push(format!("{}: begin", self.name));
            Ok(())
        }

        fn prepare(&mut self, test: &Test) -> Result<(), SinkError> {
            self.log
                .borrow_mut()
                .push(format!("{}: prepare {}", self.name, test.file()));
            Ok(())
        }

        fn finish(&mut self, _finished: &FinishedTest<'_>) -> Result<(), SinkError> {
            unreachable!("not exercised")
        }

        fn end(&mut self, _stats: &RunStats) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other(self.name)))
        }
    }

    #[test]
    fn sinks_are_notified_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sinks = SinkList::new();
        sinks
            .push(Named {
                name: "first",
                log: log.clone(),
            })
            .push(Named {
                name: "second",
                log: log.clone(),
            });
        assert_eq!(sinks.len(), 2);

        let info = RunInfo {
            run_id: ReportUuid::new_v4(),
            slot_count: 1,
            start_time: chrono::Local::now(),
        };
        sinks.begin(&info).unwrap();
        sinks
            .prepare(&Test::new("a.test", TestSignature::new("a.test")))
            .unwrap();
        assert_eq!(
            *log.borrow(),
            [
                "first: begin",
                "second: begin",
                "first: prepare a.test",
                "second: prepare a.test"
            ]
        );

        // The first failing sink stops notification.
        let error = sinks.end(&RunStats::default()).unwrap_err();
        assert_eq!(error.to_string(), "error writing to output");
        let SinkError::Io(error) = error else {
            panic!("unexpected error kind");
        };
        assert_eq!(error.to_string(), "first");
    }
}
