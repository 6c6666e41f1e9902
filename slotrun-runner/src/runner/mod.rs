// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduler: runs jobs in a bounded number of concurrency slots.
//!
//! A run proceeds in three phases:
//!
//! 1. Discovery fills the pending queue, root by root. If an outcome cache is configured, the queue
//!    is then stably sorted once so that previously failing tests are dispatched first.
//! 2. The scheduling loop hands free slots to pending jobs and polls running jobs, sleeping briefly
//!    between polls while several jobs run at once. A job is started asynchronously only if more
//!    than one slot exists and it isn't the last job left. The loop also sleeps while a single
//!    asynchronously started job is left so that it doesn't spin on it, but a lone job started
//!    synchronously has already finished and is reaped without sleeping.
//! 3. Once everything finished or the run was cancelled, sinks are told the run ended.
//!
//! Jobs are never killed by the scheduler. An interrupt ends the loop as soon as it is observed,
//! leaving running jobs to themselves, while a stop after a failure waits for running jobs first.

mod imp;
mod slots;
mod stats;

pub use imp::*;
pub use stats::*;
