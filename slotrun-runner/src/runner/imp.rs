// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CancelReason, RunStats, slots::SlotPool};
use crate::{
    cache::OutcomeCache,
    config::TestThreads,
    discovery::{Discover, JobQueue},
    errors::{DiscoveryError, JobError, RunError, SchedulerBuildError},
    interrupt::{InterruptController, InterruptToken},
    job::{EnvMap, Job, JobStartContext, RunMode, SlotId},
    reporter::{FinishedTest, OutputSink, RunInfo},
    signal::SignalHandlerKind,
    time::{StopwatchStart, stopwatch},
};
use camino::{Utf8Path, Utf8PathBuf};
use quick_junit::ReportUuid;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;

/// Scheduler options.
#[derive(Debug)]
pub struct SchedulerBuilder {
    test_threads: Option<TestThreads>,
    stop_on_failure: bool,
    cache_dir: Option<Utf8PathBuf>,
    env: EnvMap,
    poll_interval: Duration,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            test_threads: None,
            stop_on_failure: false,
            cache_dir: None,
            env: EnvMap::new(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SchedulerBuilder {
    /// How long to sleep between polls while more than one job is running, by default.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Sets the number of slots, i.e. the maximum number of jobs running at once.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets whether to stop dispatching jobs after the first failure.
    pub fn set_stop_on_failure(&mut self, stop_on_failure: bool) -> &mut Self {
        self.stop_on_failure = stop_on_failure;
        self
    }

    /// Sets the directory outcomes are cached in across runs.
    ///
    /// If set, tests are ordered by their last outcome before any of them is started.
    pub fn set_cache_dir(&mut self, cache_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Sets the environment variables passed to every job.
    pub fn set_env(&mut self, env: EnvMap) -> &mut Self {
        self.env = env;
        self
    }

    /// Sets how long to sleep between polls while more than one job is running.
    pub fn set_poll_interval(&mut self, poll_interval: Duration) -> &mut Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Creates a new scheduler.
    ///
    /// Returns an error if the cache directory is unusable. Nothing has been run at that point.
    pub fn build(self, signal_handler: SignalHandlerKind) -> Result<Scheduler, SchedulerBuildError> {
        let slot_count = self.test_threads.unwrap_or_default().compute();
        let cache = self.cache_dir.map(OutcomeCache::open).transpose()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("slotrun-worker")
            .build()
            .map_err(SchedulerBuildError::TokioRuntimeCreate)?;

        Ok(Scheduler {
            inner: SchedulerInner {
                slot_count,
                stop_on_failure: self.stop_on_failure,
                cache,
                env: self.env,
                poll_interval: self.poll_interval,
                signal_handler,
            },
            runtime,
        })
    }
}

/// Runs jobs in a bounded number of slots.
///
/// Created using [`SchedulerBuilder::build`]. A scheduler can perform any number of runs, one at a
/// time. Nothing but the outcome cache carries over from one run to the next.
#[derive(Debug)]
pub struct Scheduler {
    inner: SchedulerInner,
    runtime: Runtime,
}

impl Scheduler {
    /// Returns the number of slots jobs run in.
    pub fn slot_count(&self) -> usize {
        self.inner.slot_count
    }

    /// Returns the outcome cache directory, if one is configured.
    pub fn cache_dir(&self) -> Option<&Utf8Path> {
        self.inner.cache.as_ref().map(|cache| cache.dir())
    }

    /// Discovers jobs under `roots`, and runs all of them.
    ///
    /// `sinks` are notified of every step of the run. The returned stats are produced after the
    /// last job was assessed and every sink's [`end`](OutputSink::end) was called, including when
    /// the run was cancelled.
    ///
    /// Returns an error if discovery fails, a job can't be managed, a sink fails, or the outcome
    /// cache can't be written. Errors abort the run immediately.
    pub fn execute<D, S>(
        &mut self,
        discovery: &mut D,
        roots: &[impl AsRef<str>],
        sinks: &mut S,
    ) -> Result<RunStats, RunError>
    where
        D: Discover,
        S: OutputSink + ?Sized,
    {
        self.runtime
            .block_on(self.inner.execute(discovery, roots, sinks))
    }

    /// Discovers jobs under `roots` without running them.
    ///
    /// The returned queue is in dispatch order: if an outcome cache is configured, it has been
    /// sorted by last outcome.
    pub fn discover<D: Discover>(
        &mut self,
        discovery: &mut D,
        roots: &[impl AsRef<str>],
    ) -> Result<JobQueue<D::Job>, DiscoveryError> {
        let mut queue = JobQueue::new();
        for root in roots {
            discovery.discover(root.as_ref(), &mut queue)?;
        }
        self.inner.sort_by_last_outcome(&mut queue);
        Ok(queue)
    }
}

#[derive(Debug)]
struct SchedulerInner {
    slot_count: usize,
    stop_on_failure: bool,
    cache: Option<OutcomeCache>,
    env: EnvMap,
    poll_interval: Duration,
    signal_handler: SignalHandlerKind,
}

impl SchedulerInner {
    async fn execute<D, S>(
        &mut self,
        discovery: &mut D,
        roots: &[impl AsRef<str>],
        sinks: &mut S,
    ) -> Result<RunStats, RunError>
    where
        D: Discover,
        S: OutputSink + ?Sized,
    {
        let run_stopwatch = stopwatch();
        let token = InterruptToken::new();
        // Disarmed when dropped, so errors that abort the run also remove the listener.
        let mut controller = InterruptController::arm(self.signal_handler, token.clone());

        sinks.begin(&RunInfo {
            run_id: ReportUuid::new_v4(),
            slot_count: self.slot_count,
            start_time: run_stopwatch.snapshot().start_time,
        })?;

        let mut queue = JobQueue::new();
        for root in roots {
            let root = root.as_ref();
            let start = queue.len();
            discovery.discover(root, &mut queue)?;
            for test in queue.tests_from(start) {
                sinks.prepare(test)?;
            }
        }
        self.sort_by_last_outcome(&mut queue);

        let mut run = RunState::new(queue, self.slot_count);
        self.run_loop(&mut run, &controller, &token, sinks).await?;

        debug!("disarming interrupt controller ({:?})", controller.state());
        controller.disarm();

        let mut stats = run.stats;
        stats.elapsed = run_stopwatch.snapshot().duration;
        sinks.end(&stats)?;
        Ok(stats)
    }

    fn sort_by_last_outcome<J: Job>(&mut self, queue: &mut JobQueue<J>) {
        if let Some(cache) = &mut self.cache {
            queue.sort_by_cached_key(|job| cache.last_outcome(job.test()));
        }
    }

    async fn run_loop<J, S>(
        &mut self,
        run: &mut RunState<J>,
        controller: &InterruptController,
        token: &InterruptToken,
        sinks: &mut S,
    ) -> Result<(), RunError>
    where
        J: Job,
        S: OutputSink + ?Sized,
    {
        while run.has_work() {
            // Dispatch into every free slot.
            while run.can_dispatch() {
                if controller.is_interrupted().await {
                    run.stats.cancel(CancelReason::Signal);
                    return Ok(());
                }

                // Decided before the job leaves the queue, so the job itself is counted.
                let mode = if self.slot_count > 1 && run.in_flight.len() + run.queue.len() > 1 {
                    RunMode::Async
                } else {
                    RunMode::Sync
                };
                let Some((slot, mut job)) = run.pop_next() else {
                    break;
                };

                debug!(file = %job.test().file(), %slot, %mode, "dispatching job");
                let job_stopwatch = stopwatch();
                run.stats.started_count += 1;
                job.start(JobStartContext {
                    mode,
                    slot,
                    slot_count: self.slot_count,
                    env: &self.env,
                    interrupt: token,
                })
                .await?;

                run.in_flight.push(InFlight {
                    job,
                    slot,
                    mode,
                    stopwatch: job_stopwatch,
                });
            }

            if run.should_sleep_before_poll() {
                tokio::time::sleep(self.poll_interval).await;
            }

            let mut index = 0;
            while index < run.in_flight.len() {
                if controller.is_interrupted().await {
                    run.stats.cancel(CancelReason::Signal);
                    return Ok(());
                }

                if run.in_flight[index].job.is_running()? {
                    index += 1;
                    continue;
                }

                // Completion order doesn't matter, so the in-flight set needn't stay ordered.
                let done = run.in_flight.swap_remove(index);
                let released = run.slots.release(done.slot);
                debug_assert!(released, "slot {} was held by one job", done.slot);
                self.complete(done, run, sinks).await?;
            }
        }

        Ok(())
    }

    async fn complete<J, S>(
        &mut self,
        done: InFlight<J>,
        run: &mut RunState<J>,
        sinks: &mut S,
    ) -> Result<(), RunError>
    where
        J: Job,
        S: OutputSink + ?Sized,
    {
        let InFlight {
            mut job,
            slot,
            mode,
            stopwatch,
        } = done;
        let time_taken = stopwatch.snapshot();
        let assessment = job.assess().await?;
        let outcome = assessment.outcome;
        let test = job.test();
        if !outcome.is_terminal() {
            return Err(JobError::NotFinalized {
                file: test.file().to_owned(),
            }
            .into());
        }

        debug!(file = %test.file(), %slot, %outcome, "job finished");
        run.stats.on_test_finished(outcome);
        sinks.finish(&FinishedTest {
            test,
            outcome,
            slot,
            mode,
            time_taken,
            output: &assessment.output,
            detail: assessment.detail.as_deref(),
        })?;

        if let Some(cache) = &mut self.cache
            && cache.record(test, outcome)?
        {
            run.stats.cache_writes += 1;
        }

        if outcome.is_failure() && self.stop_on_failure {
            debug!("stopping dispatch after failure of {}", test.file());
            run.stats.cancel(CancelReason::StopOnFailure);
        }
        Ok(())
    }
}

/// The state of a single run. Nothing in here outlives the run.
struct RunState<J> {
    queue: JobQueue<J>,
    in_flight: Vec<InFlight<J>>,
    slots: SlotPool,
    stats: RunStats,
}

impl<J: Job> RunState<J> {
    fn new(queue: JobQueue<J>, slot_count: usize) -> Self {
        let stats = RunStats {
            initial_run_count: queue.len(),
            ..RunStats::default()
        };
        Self {
            queue,
            in_flight: Vec::with_capacity(slot_count),
            slots: SlotPool::new(slot_count),
            stats,
        }
    }

    fn has_work(&self) -> bool {
        !self.in_flight.is_empty() || (self.stats.cancel_reason.is_none() && !self.queue.is_empty())
    }

    fn should_sleep_before_poll(&self) -> bool {
        // A lone job started synchronously has already finished, so it is reaped right away.
        match self.in_flight.as_slice() {
            [] => false,
            [only] => only.mode == RunMode::Async,
            _ => true,
        }
    }

    fn can_dispatch(&self) -> bool {
        // Any cancellation stops dispatch. A stop on failure still waits for running jobs.
        self.stats.cancel_reason.is_none() && self.slots.has_free() && !self.queue.is_empty()
    }

    fn pop_next(&mut self) -> Option<(SlotId, J)> {
        if self.queue.is_empty() {
            return None;
        }
        let slot = self.slots.acquire()?;
        match self.queue.pop_front() {
            Some(job) => Some((slot, job)),
            None => {
                self.slots.release(slot);
                None
            }
        }
    }
}

struct InFlight<J> {
    job: J,
    slot: SlotId,
    mode: RunMode,
    stopwatch: StopwatchStart,
}
