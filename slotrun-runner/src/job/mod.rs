// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jobs: schedulable units that each run one test out of process.
//!
//! The scheduler only relies on the [`Job`] trait: a job can be started in either
//! [`RunMode`], polled for liveness, and assessed once it has finished. [`ProcessJob`] is the
//! standard implementation, which runs a test file through an [`Interpreter`].

mod process;

pub use process::*;

use crate::{errors::JobError, interrupt::InterruptToken, unit::Test, unit::TestOutcome};
use bytes::Bytes;
use indexmap::IndexMap;
use std::{fmt, future::Future};

/// Environment variables applied to every job in a run.
pub type EnvMap = IndexMap<String, String>;

/// How a job is started.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RunMode {
    /// [`Job::start`] returns only once the job has finished.
    Sync,

    /// [`Job::start`] returns as soon as the job is running.
    Async,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// One of the `N` interchangeable concurrency slots handed to running jobs.
///
/// Slots are numbered from 1. At any time, a slot is held by at most one job, so jobs can use it
/// to select a private scratch resource.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SlotId(usize);

impl SlotId {
    /// Creates a new slot ID.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the slot number.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a job is given when it is started.
#[derive(Clone, Copy, Debug)]
pub struct JobStartContext<'a> {
    /// Whether to block until the job is done.
    pub mode: RunMode,

    /// The slot assigned to this job.
    pub slot: SlotId,

    /// The total number of slots in this run.
    pub slot_count: usize,

    /// Environment variables to apply to the job.
    pub env: &'a EnvMap,

    /// The run's interrupt token.
    pub interrupt: &'a InterruptToken,
}

/// Output captured from a job.
#[derive(Clone, Debug, Default)]
pub struct JobOutput {
    /// Standard output.
    pub stdout: Bytes,

    /// Standard error.
    pub stderr: Bytes,
}

impl JobOutput {
    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// The result of assessing a finished job.
#[derive(Clone, Debug)]
pub struct Assessment {
    /// The terminal outcome of the test.
    pub outcome: TestOutcome,

    /// Output captured while the job ran.
    pub output: JobOutput,

    /// A short description of how the job ended, e.g. "exited with code 1".
    pub detail: Option<String>,
}

impl Assessment {
    /// Creates an assessment with no output or detail.
    pub fn new(outcome: TestOutcome) -> Self {
        Self {
            outcome,
            output: JobOutput::default(),
            detail: None,
        }
    }
}

/// A unit of work wrapping one test.
///
/// Each job is started exactly once, polled with [`is_running`](Self::is_running) until it
/// returns false, then assessed exactly once.
pub trait Job {
    /// Returns the test this job runs.
    fn test(&self) -> &Test;

    /// Starts the job.
    ///
    /// With [`RunMode::Sync`], the returned future resolves once the job has finished. With
    /// [`RunMode::Async`], it resolves as soon as the job is running.
    fn start(&mut self, cx: JobStartContext<'_>) -> impl Future<Output = Result<(), JobError>>;

    /// Returns true if the job is still running. Never blocks.
    fn is_running(&mut self) -> Result<bool, JobError>;

    /// Assesses a finished job, producing the test's terminal outcome.
    fn assess(&mut self) -> impl Future<Output = Result<Assessment, JobError>>;
}
