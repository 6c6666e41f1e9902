// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FixtureDir, FixtureStatus, scheduler};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use slotrun_runner::{
    errors::{DiscoveryError, RunError},
    reporter::{DisplaySinkBuilder, DisplayStderr, JunitSink, SinkList},
    runner::CancelReason,
};

#[test]
fn run_reports_every_outcome() -> Result<()> {
    let fixtures = FixtureDir::new(&[
        ("pass.test", FixtureStatus::Pass),
        ("nested/fail.test", FixtureStatus::Fail),
        ("skip.t", FixtureStatus::Skip),
        ("helper.sh", FixtureStatus::Fail),
    ])?;
    let junit_path = fixtures.join("out/junit.xml");

    let mut buffer = Vec::new();
    let stats = {
        let mut sinks = SinkList::new();
        sinks
            .push(DisplaySinkBuilder::default().build(DisplayStderr::Buffer(&mut buffer)))
            .push(JunitSink::new(&junit_path));
        scheduler(2, |_| {})?.execute(
            &mut fixtures.discovery()?,
            &[fixtures.path().as_str()],
            &mut sinks,
        )?
    };

    // helper.sh doesn't match the test patterns, so it's never run.
    assert_eq!(stats.initial_run_count, 3);
    assert_eq!((stats.passed, stats.failed, stats.skipped), (1, 1, 1));
    assert!(!stats.is_success());
    assert_eq!(stats.cancel_reason, None);

    let output = String::from_utf8(buffer)?;
    assert!(output.contains("Starting 3 tests across 2 slots"), "{output}");
    assert!(output.contains("exited with code 1"), "{output}");
    assert!(output.contains("assertion failed"), "{output}");
    assert!(output.contains("3 tests run: 1 passed, 1 failed, 1 skipped"), "{output}");

    let xml = std::fs::read_to_string(&junit_path)?;
    assert!(xml.contains(r#"tests="3""#), "{xml}");
    assert!(xml.contains(r#"failures="1""#), "{xml}");
    assert!(xml.contains("expected 2, got 3"), "{xml}");
    Ok(())
}

#[test]
fn passing_run_is_success() -> Result<()> {
    let fixtures = FixtureDir::new(&[
        ("a.test", FixtureStatus::Pass),
        ("b.test", FixtureStatus::Pass),
        ("c.test", FixtureStatus::Skip),
    ])?;
    let stats = scheduler(4, |_| {})?.execute(
        &mut fixtures.discovery()?,
        &[fixtures.join("a.test").as_str(), fixtures.join("*.test").as_str()],
        &mut SinkList::new(),
    )?;

    // a.test is named twice, and is run twice.
    assert_eq!(stats.initial_run_count, 4);
    assert_eq!((stats.passed, stats.skipped), (3, 1));
    assert!(stats.is_success());
    Ok(())
}

#[test]
fn stop_on_failure_leaves_tests_unrun() -> Result<()> {
    let fixtures = FixtureDir::new(&[
        ("1.test", FixtureStatus::Fail),
        ("2.test", FixtureStatus::Pass),
        ("3.test", FixtureStatus::Pass),
    ])?;
    let stats = scheduler(1, |builder| {
        builder.set_stop_on_failure(true);
    })?
    .execute(
        &mut fixtures.discovery()?,
        &[fixtures.path().as_str()],
        &mut SinkList::new(),
    )?;

    assert_eq!(stats.cancel_reason, Some(CancelReason::StopOnFailure));
    assert_eq!(stats.finished_count, 1);
    assert_eq!(stats.not_run_count(), 2);
    Ok(())
}

#[test]
fn cache_runs_failures_first() -> Result<()> {
    let fixtures = FixtureDir::new(&[
        ("a.test", FixtureStatus::Pass),
        ("b.test", FixtureStatus::Pass),
        ("z.test", FixtureStatus::Fail),
    ])?;
    let cache_dir = Utf8TempDir::new()?;
    let roots = [fixtures.path().as_str()];

    let mut scheduler = scheduler(1, |builder| {
        builder.set_cache_dir(cache_dir.path());
    })?;
    let stats = scheduler.execute(&mut fixtures.discovery()?, &roots, &mut SinkList::new())?;
    assert_eq!(stats.cache_writes, 3);

    let queue = scheduler.discover(&mut fixtures.discovery()?, &roots)?;
    let order: Vec<_> = queue
        .tests()
        .map(|test| test.file().file_name().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(order, ["z.test", "a.test", "b.test"]);

    let stats = scheduler.execute(&mut fixtures.discovery()?, &roots, &mut SinkList::new())?;
    assert_eq!(stats.cache_writes, 0, "outcomes are unchanged");
    Ok(())
}

#[test]
fn missing_root_is_an_error() -> Result<()> {
    let fixtures = FixtureDir::new(&[("a.test", FixtureStatus::Pass)])?;
    let error = scheduler(2, |_| {})?
        .execute(
            &mut fixtures.discovery()?,
            &[fixtures.join("does-not-exist").as_str()],
            &mut SinkList::new(),
        )
        .unwrap_err();
    assert!(
        matches!(error, RunError::Discovery(DiscoveryError::PathNotFound { .. })),
        "unexpected error: {error}"
    );
    Ok(())
}
