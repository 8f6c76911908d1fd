// SPDX-License-Identifier: MIT

pub mod admission;
pub mod checkpoint;
pub mod config;
pub mod pipeline;
pub mod resilience;
pub mod workflow;
