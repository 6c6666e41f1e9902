// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for slotrun.
//!
//! See [`SlotrunConfig`] for the layering rules, and `default-config.toml` for the available keys.

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
