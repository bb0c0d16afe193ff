//! Parsed Graphite expressions.
//!
//! Expressions are produced by an external parser and only read here. A
//! call keeps the original argument text so outputs can be named exactly as
//! the user wrote the target.

use std::fmt::{Display, Formatter};

/// A node of a parsed Graphite target.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A metric pattern, possibly containing globs, resolved against the
    /// fetched-data set.
    Name(String),
    /// A numeric literal.
    Constant(f64),
    /// A function applied to its arguments.
    Call(Call),
}

impl Expr {
    pub fn name(pattern: impl Into<String>) -> Self {
        Expr::Name(pattern.into())
    }

    pub fn constant(value: f64) -> Self {
        Expr::Constant(value)
    }

    /// Builds a call node whose raw argument text is derived from `args`.
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(Call::new(function, args))
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Name(pattern) => write!(f, "{}", pattern),
            Expr::Constant(value) => write!(f, "{}", format_constant(*value)),
            Expr::Call(call) => write!(f, "{}", call),
        }
    }
}

/// A function call node.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    name: String,
    args: Vec<Expr>,
    raw_args: String,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        let raw_args = args
            .iter()
            .map(Expr::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self {
            name: name.into(),
            args,
            raw_args,
        }
    }

    /// Builds a call node carrying the argument text exactly as parsed.
    pub fn with_raw_args(
        name: impl Into<String>,
        args: Vec<Expr>,
        raw_args: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }

    pub fn raw_args(&self) -> &str {
        &self.raw_args
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.raw_args)
    }
}

/// Shortest decimal form of a literal; `2.0` renders as `2`.
pub(crate) fn format_constant(value: f64) -> String {
    format!("{}", value)
}
