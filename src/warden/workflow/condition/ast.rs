// SPDX-License-Identifier: MIT

//! Parsed form of an edge guard

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `path op value`
    Compare {
        path: String,
        op: CompareOp,
        value: Literal,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// A bare path, true when the value is truthy
    Truthy(String),
    /// `true` or `false` written on its own
    Constant(bool),
}

impl Expression {
    /// State paths the guard reads, in source order
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Compare { path, .. } | Expression::Truthy(path) => out.push(path),
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            Expression::Not(inner) => inner.collect_paths(out),
            Expression::Constant(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring for strings, membership for arrays
    Contains,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Num(n) => Some(*n),
            _ => None,
        }
    }
}
