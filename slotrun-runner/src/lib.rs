// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for slotrun, a scheduler that runs test files in a bounded number of
//! concurrency slots.
//!
//! The basic flow of a run is:
//!
//! 1. A [`Discover`](discovery::Discover) implementation turns each root into jobs.
//! 2. If an outcome cache is configured, jobs that failed last time are moved to the front.
//! 3. The [`Scheduler`](runner::Scheduler) dispatches jobs into free slots, polls them, and assesses
//!    each one as it finishes.
//! 4. Every step is reported to an [`OutputSink`](reporter::OutputSink).

pub mod cache;
pub mod config;
pub mod discovery;
pub mod errors;
mod helpers;
pub mod interrupt;
pub mod job;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod time;
pub mod unit;
