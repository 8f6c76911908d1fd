// SPDX-License-Identifier: MIT

//! Edge guards for step graphs
//!
//! Guards are small expressions evaluated against the merged workflow state:
//! - `question.confidence >= 0.5`
//! - `review.decision == 'modify' or review.decision == 'regenerate'`
//! - `not execution.success and generation.attempts < 3`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;
