// SPDX-License-Identifier: MIT

//! Shared building blocks: the crate error hierarchy and the injectable
//! clock/sleep abstractions.

pub mod error;
pub mod runtime;
