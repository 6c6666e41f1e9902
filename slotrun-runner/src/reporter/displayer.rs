// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output for a run.

use super::{FinishedTest, OutputSink, RunInfo};
use crate::{
    errors::SinkError,
    helpers::plural,
    runner::RunStats,
    unit::{Test, TestOutcome},
};
use bytes::Bytes;
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use swrite::{SWrite, swrite};

/// Standard error destination for the display sink.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum DisplayStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Builder for a [`DisplaySink`].
#[derive(Debug)]
pub struct DisplaySinkBuilder {
    colorize: bool,
    failure_output: bool,
}

impl Default for DisplaySinkBuilder {
    fn default() -> Self {
        Self {
            colorize: false,
            failure_output: true,
        }
    }
}

impl DisplaySinkBuilder {
    /// Sets whether output is colorized. Defaults to false.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Sets whether the captured output of failing tests is shown. Defaults to true.
    pub fn set_failure_output(&mut self, failure_output: bool) -> &mut Self {
        self.failure_output = failure_output;
        self
    }

    /// Creates a new display sink writing to `stderr`.
    pub fn build<'a>(&self, stderr: DisplayStderr<'a>) -> DisplaySink<'a> {
        let mut styles = Styles::default();
        if self.colorize {
            styles.colorize();
        }

        DisplaySink {
            stderr,
            styles,
            failure_output: self.failure_output,
            slot_count: 0,
            prepared: 0,
            header_written: false,
        }
    }
}

/// An [`OutputSink`] that prints one line per finished test and a summary at the end.
pub struct DisplaySink<'a> {
    stderr: DisplayStderr<'a>,
    styles: Styles,
    failure_output: bool,
    slot_count: usize,
    prepared: usize,
    header_written: bool,
}

impl DisplaySink<'_> {
    fn emit(&mut self, buf: &[u8]) -> Result<(), SinkError> {
        match &mut self.stderr {
            DisplayStderr::Terminal => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(buf).and_then(|()| stderr.flush())
            }
            DisplayStderr::Buffer(buffer) => {
                buffer.extend_from_slice(buf);
                Ok(())
            }
        }
        .map_err(SinkError::Io)
    }

    // Every test is prepared before the first one finishes, so the count is only known then.
    fn write_header(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;

        write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
        writeln!(
            writer,
            "{} {} across {} {}",
            self.prepared.style(self.styles.count),
            plural::tests_str(self.prepared),
            self.slot_count.style(self.styles.count),
            plural::slots_str(self.slot_count),
        )
    }

    fn write_finished(
        &mut self,
        finished: &FinishedTest<'_>,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        self.write_header(writer)?;

        let (label, style) = match finished.outcome {
            TestOutcome::Passed => ("PASS", self.styles.pass),
            TestOutcome::Skipped => ("SKIP", self.styles.skip),
            TestOutcome::Failed | TestOutcome::Prepared => ("FAIL", self.styles.fail),
        };
        write!(writer, "{:>12} ", label.style(style))?;
        write_duration(finished.time_taken.duration, writer)?;
        writeln!(writer, "{}", finished.test.file())?;

        if finished.outcome.is_failure() && self.failure_output {
            self.write_failure_output(finished, writer)?;
        }
        Ok(())
    }

    fn write_failure_output(
        &self,
        finished: &FinishedTest<'_>,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let file = finished.test.file();
        if let Some(detail) = finished.detail {
            writeln!(writer, "{:>12} {detail}", "")?;
        }
        write_output_block("STDOUT", file.as_str(), &finished.output.stdout, &self.styles, writer)?;
        write_output_block("STDERR", file.as_str(), &finished.output.stderr, &self.styles, writer)
    }

    fn write_end(&mut self, stats: &RunStats, writer: &mut dyn Write) -> io::Result<()> {
        self.write_header(writer)?;

        if let Some(reason) = stats.cancel_reason {
            write!(writer, "{:>12} ", "Cancelled".style(self.styles.fail))?;
            write!(writer, "due to {reason}")?;
            let abandoned = stats.abandoned_count();
            if abandoned > 0 {
                write!(
                    writer,
                    ": {} {} left running",
                    abandoned.style(self.styles.count),
                    plural::tests_str(abandoned),
                )?;
            }
            writeln!(writer)?;
        }

        let summary_style = if stats.failed > 0 || stats.cancel_reason.is_some() {
            self.styles.fail
        } else if stats.finished_count == 0 {
            self.styles.skip
        } else {
            self.styles.pass
        };
        write!(writer, "------------\n{:>12} ", "Summary".style(summary_style))?;
        write_duration(stats.elapsed, writer)?;

        write!(writer, "{}", stats.finished_count.style(self.styles.count))?;
        if stats.finished_count != stats.initial_run_count {
            write!(writer, "/{}", stats.initial_run_count.style(self.styles.count))?;
        }
        // Both initial and finished counts must be 1 for the singular form.
        let tests_str =
            plural::tests_plural_if(stats.initial_run_count != 1 || stats.finished_count != 1);

        let mut summary_str = String::new();
        write_summary_str(stats, &self.styles, &mut summary_str);
        writeln!(writer, " {tests_str} run: {summary_str}")
    }
}

impl OutputSink for DisplaySink<'_> {
    fn begin(&mut self, info: &RunInfo) -> Result<(), SinkError> {
        self.slot_count = info.slot_count;
        self.prepared = 0;
        self.header_written = false;
        Ok(())
    }

    fn prepare(&mut self, _test: &Test) -> Result<(), SinkError> {
        self.prepared += 1;
        Ok(())
    }

    fn finish(&mut self, finished: &FinishedTest<'_>) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        self.write_finished(finished, &mut buf)
            .map_err(SinkError::Io)?;
        self.emit(&buf)
    }

    fn end(&mut self, stats: &RunStats) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        self.write_end(stats, &mut buf).map_err(SinkError::Io)?;
        self.emit(&buf)
    }
}

fn write_duration(duration: Duration, writer: &mut dyn Write) -> io::Result<()> {
    // * > means right-align.
    // * 8 is the number of characters to pad to.
    // * .3 means print three digits after the decimal point.
    write!(writer, "[{:>8.3?}s] ", duration.as_secs_f64())
}

fn write_output_block(
    name: &str,
    file: &str,
    output: &Bytes,
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if output.is_empty() {
        return Ok(());
    }
    writeln!(
        writer,
        "{}",
        format!("--- {name}: {file} ---").style(styles.fail_output)
    )?;
    writer.write_all(output)?;
    if !output.ends_with(b"\n") {
        writeln!(writer)?;
    }
    Ok(())
}

fn write_summary_str(stats: &RunStats, styles: &Styles, out: &mut String) {
    swrite!(
        out,
        "{} {}, ",
        stats.passed.style(styles.count),
        "passed".style(styles.pass)
    );

    if stats.failed > 0 {
        swrite!(
            out,
            "{} {}, ",
            stats.failed.style(styles.count),
            "failed".style(styles.fail),
        );
    }

    swrite!(
        out,
        "{} {}",
        stats.skipped.style(styles.count),
        "skipped".style(styles.skip),
    );

    let not_run = stats.not_run_count();
    if not_run > 0 {
        swrite!(
            out,
            ", {} {}",
            not_run.style(styles.count),
            "not run".style(styles.skip),
        );
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    fail_output: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.fail_output = Style::new().magenta();
        self.skip = Style::new().yellow().bold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::{JobOutput, RunMode, SlotId},
        runner::CancelReason,
        time::StopwatchSnapshot,
        unit::TestSignature,
    };
    use chrono::Local;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use quick_junit::ReportUuid;

    fn finished<'a>(
        test: &'a Test,
        outcome: TestOutcome,
        millis: u64,
        output: &'a JobOutput,
        detail: Option<&'a str>,
    ) -> FinishedTest<'a> {
        FinishedTest {
            test,
            outcome,
            slot: SlotId::new(1),
            mode: RunMode::Async,
            time_taken: StopwatchSnapshot {
                start_time: Local::now(),
                duration: Duration::from_millis(millis),
            },
            output,
            detail,
        }
    }

    fn run_info(slot_count: usize) -> RunInfo {
        RunInfo {
            run_id: ReportUuid::new_v4(),
            slot_count,
            start_time: Local::now(),
        }
    }

    #[test]
    fn display_run() {
        let tests: Vec<_> = ["a.test", "b.test", "c.test"]
            .into_iter()
            .map(|file| Test::new(file, TestSignature::new(file)))
            .collect();
        let empty = JobOutput::default();
        let failing_output = JobOutput {
            stdout: Bytes::from_static(b"expected 1, got 2\n"),
            stderr: Bytes::from_static(b"warning: oops"),
        };

        let mut buf = Vec::new();
        let mut sink = DisplaySinkBuilder::default().build(DisplayStderr::Buffer(&mut buf));
        sink.begin(&run_info(2)).unwrap();
        for test in &tests {
            sink.prepare(test).unwrap();
        }
        sink.finish(&finished(&tests[1], TestOutcome::Passed, 12, &empty, None))
            .unwrap();
        sink.finish(&finished(
            &tests[0],
            TestOutcome::Failed,
            1500,
            &failing_output,
            Some("exited with code 1"),
        ))
        .unwrap();
        sink.finish(&finished(&tests[2], TestOutcome::Skipped, 3, &empty, None))
            .unwrap();
        sink.end(&RunStats {
            initial_run_count: 3,
            started_count: 3,
            finished_count: 3,
            passed: 1,
            skipped: 1,
            failed: 1,
            elapsed: Duration::from_millis(1520),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                    Starting 3 tests across 2 slots
                        PASS [   0.012s] b.test
                        FAIL [   1.500s] a.test
                             exited with code 1
                --- STDOUT: a.test ---
                expected 1, got 2
                --- STDERR: a.test ---
                warning: oops
                        SKIP [   0.003s] c.test
                ------------
                     Summary [   1.520s] 3 tests run: 1 passed, 1 failed, 1 skipped
            "}
        );
    }

    #[test]
    fn display_cancelled_run() {
        let test = Test::new("a.test", TestSignature::new("a.test"));
        let empty = JobOutput::default();

        let mut buf = Vec::new();
        let mut sink = DisplaySinkBuilder::default().build(DisplayStderr::Buffer(&mut buf));
        sink.begin(&run_info(1)).unwrap();
        for _ in 0..4 {
            sink.prepare(&test).unwrap();
        }
        sink.finish(&finished(&test, TestOutcome::Passed, 1, &empty, None))
            .unwrap();
        sink.end(&RunStats {
            initial_run_count: 4,
            started_count: 2,
            finished_count: 1,
            passed: 1,
            cancel_reason: Some(CancelReason::Signal),
            elapsed: Duration::from_millis(5),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                    Starting 4 tests across 1 slot
                        PASS [   0.001s] a.test
                   Cancelled due to interrupt: 1 test left running
                ------------
                     Summary [   0.005s] 1/4 tests run: 1 passed, 0 skipped, 2 not run
            "}
        );
    }

    #[test]
    fn display_empty_run() {
        let mut buf = Vec::new();
        let mut sink = DisplaySinkBuilder::default().build(DisplayStderr::Buffer(&mut buf));
        sink.begin(&run_info(4)).unwrap();
        sink.end(&RunStats::default()).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                    Starting 0 tests across 4 slots
                ------------
                     Summary [   0.000s] 0 tests run: 0 passed, 0 skipped
            "}
        );
    }
}
