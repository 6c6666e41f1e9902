// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{FinishedTest, OutputSink, RunInfo};
use crate::{errors::SinkError, runner::RunStats, unit::Test, unit::TestOutcome};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use quick_junit::{NonSuccessKind, Report, ReportUuid, TestCase, TestCaseStatus, TestSuite};
use std::fs::File;

/// An [`OutputSink`] that writes a JUnit XML report once the run ends.
#[derive(Clone, Debug)]
pub struct JunitSink {
    path: Utf8PathBuf,
    run: Option<(ReportUuid, DateTime<Local>)>,
    test_cases: Vec<TestCase>,
}

impl JunitSink {
    /// The name of the report and its single test suite.
    pub const REPORT_NAME: &'static str = "slotrun-run";

    /// Creates a new sink that writes its report to `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            run: None,
            test_cases: Vec::new(),
        }
    }

    fn write_report(&mut self, stats: &RunStats) -> Result<(), SinkError> {
        let mut test_suite = TestSuite::new(Self::REPORT_NAME);
        test_suite.add_test_cases(self.test_cases.drain(..));

        let mut report = Report::new(Self::REPORT_NAME);
        if let Some((run_id, start_time)) = self.run {
            report.set_report_uuid(run_id).set_timestamp(start_time);
        }
        report.set_time(stats.elapsed).add_test_suite(test_suite);

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|error| SinkError::Fs {
                file: dir.to_owned(),
                error,
            })?;
        }
        let f = File::create(&self.path).map_err(|error| SinkError::Fs {
            file: self.path.clone(),
            error,
        })?;
        report.serialize(f).map_err(|error| SinkError::Junit {
            file: self.path.clone(),
            error,
        })
    }
}

impl OutputSink for JunitSink {
    fn begin(&mut self, info: &RunInfo) -> Result<(), SinkError> {
        self.run = Some((info.run_id, info.start_time));
        self.test_cases.clear();
        Ok(())
    }

    fn prepare(&mut self, _test: &Test) -> Result<(), SinkError> {
        Ok(())
    }

    fn finish(&mut self, finished: &FinishedTest<'_>) -> Result<(), SinkError> {
        let mut status = match finished.outcome {
            TestOutcome::Passed => TestCaseStatus::success(),
            TestOutcome::Skipped => TestCaseStatus::skipped(),
            TestOutcome::Failed | TestOutcome::Prepared => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                status.set_type("test failure");
                status
            }
        };
        if let Some(detail) = finished.detail {
            status.set_message(detail);
        }

        let mut test_case = TestCase::new(finished.test.file().as_str(), status);
        test_case
            .set_classname(Self::REPORT_NAME)
            .set_timestamp(finished.time_taken.start_time)
            .set_time(finished.time_taken.duration);
        if finished.outcome.is_failure() {
            test_case
                .set_system_out(String::from_utf8_lossy(&finished.output.stdout).into_owned())
                .set_system_err(String::from_utf8_lossy(&finished.output.stderr).into_owned());
        }

        self.test_cases.push(test_case);
        Ok(())
    }

    fn end(&mut self, stats: &RunStats) -> Result<(), SinkError> {
        self.write_report(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::{JobOutput, RunMode, SlotId},
        time::StopwatchSnapshot,
        unit::TestSignature,
    };
    use bytes::Bytes;
    use camino_tempfile::Utf8TempDir;
    use std::time::Duration;

    #[test]
    fn writes_report_at_end() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("nested/junit.xml");
        let mut sink = JunitSink::new(&path);

        sink.begin(&RunInfo {
            run_id: ReportUuid::new_v4(),
            slot_count: 2,
            start_time: Local::now(),
        })
        .unwrap();

        let passing = Test::new("ok.test", TestSignature::new("ok.test"));
        let failing = Test::new("bad.test", TestSignature::new("bad.test"));
        let output = JobOutput {
            stdout: Bytes::from_static(b"assertion <failed>"),
            stderr: Bytes::new(),
        };
        for (test, outcome, detail) in [
            (&passing, TestOutcome::Passed, None),
            (&failing, TestOutcome::Failed, Some("exited with code 1")),
        ] {
            sink.finish(&FinishedTest {
                test,
                outcome,
                slot: SlotId::new(1),
                mode: RunMode::Async,
                time_taken: StopwatchSnapshot {
                    start_time: Local::now(),
                    duration: Duration::from_millis(25),
                },
                output: &output,
                detail,
            })
            .unwrap();
        }
        assert!(!path.exists(), "report is only written at the end");

        sink.end(&RunStats::default()).unwrap();
        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains(r#"name="ok.test""#), "{xml}");
        assert!(xml.contains(r#"name="bad.test""#), "{xml}");
        assert!(xml.contains("exited with code 1"), "{xml}");
        assert!(xml.contains("assertion &lt;failed&gt;"), "{xml}");
        assert!(xml.contains(r#"name="slotrun-run""#), "{xml}");
        assert!(xml.contains(r#"tests="2""#), "{xml}");
        assert!(xml.contains(r#"failures="1""#), "{xml}");
    }
}
