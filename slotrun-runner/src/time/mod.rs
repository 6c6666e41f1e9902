// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timing for runs and jobs.

mod stopwatch;

pub use stopwatch::StopwatchSnapshot;
pub(crate) use stopwatch::{StopwatchStart, stopwatch};
