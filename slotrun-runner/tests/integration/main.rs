// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs shell script fixtures through the whole scheduler.

#![cfg(unix)]

mod basic;
mod fixtures;
