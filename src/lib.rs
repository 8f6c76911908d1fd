// SPDX-License-Identifier: MIT

//! warden-rs: resumable step-graph orchestration
//!
//! A [`StateGraphExecutor`](warden::workflow::graph::StateGraphExecutor)
//! walks named steps over a shared JSON state. Failures go through
//! classification, retry, circuit breaking and recovery before the run is
//! halted; steps that need a human decision suspend the thread behind a
//! checkpoint that `resume` picks up later. The analytical pipeline in
//! [`warden::pipeline`] is built on top and guards every query with a
//! dry-run admission check.

pub mod base;
pub mod warden;

pub use base::error::WardenError;
