// SPDX-License-Identifier: MIT

//! Dry-run admission control for expensive remote queries
//!
//! A [`QueryProbe`] reports what a query *would* scan without running it.
//! The [`AdmissionController`] turns that estimate into a verdict, and only
//! an admitting verdict carries the [`AdmissionTicket`] that
//! [`QueryExecutor::execute`] demands.

pub mod controller;
pub mod probe;

pub use controller::{
    AdmissionController, AdmissionDecision, AdmissionSettings, AdmissionTicket, Verdict,
};
pub use probe::{
    ExecutionBudget, ProbeEstimate, QueryDescriptor, QueryError, QueryExecutor, QueryProbe,
    QueryResult, Row,
};
