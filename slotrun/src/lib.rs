// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs test files in parallel across a fixed number of slots.
//!
//! The scheduling logic lives in the `slotrun-runner` crate. This crate is the command-line
//! front end: it loads configuration, sets up logging, and maps run results to exit codes.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, StderrStyles};
