//! Graphite expression evaluation over pre-fetched time series.
//!
//! This crate evaluates parsed Graphite render targets (an [`Expr`] tree)
//! against a [`FetchedData`] set that the fetch layer populated beforehand.
//! Evaluation performs no I/O: metric names resolve to the series stored
//! under the same pattern and window, and function calls dispatch through
//! a [`FunctionRegistry`] shared by all evaluators.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use graphite::{Evaluator, Expr, FetchedData, FunctionRegistry, Series};
//!
//! let mut data = FetchedData::new();
//! data.insert(
//!     "servers.*.cpu",
//!     0,
//!     60,
//!     vec![
//!         Series::from_values("servers.web1.cpu", 0, 10, &[1.0, 2.0]),
//!         Series::from_values("servers.web2.cpu", 0, 10, &[3.0, 4.0]),
//!     ],
//! );
//!
//! let evaluator = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()));
//! let expr = Expr::call(
//!     "scale",
//!     vec![Expr::name("servers.*.cpu"), Expr::constant(10.0)],
//! );
//! let result = evaluator.evaluate(&expr, 0, 60, &data)?;
//!
//! assert_eq!(result.len(), 2);
//! assert_eq!(result[1].name(), "scale(servers.web2.cpu,10)");
//! assert_eq!(result[1].samples(), &[Some(30.0), Some(40.0)]);
//! # Ok::<(), graphite::Error>(())
//! ```

mod config;
mod error;
mod evaluator;
mod expr;
pub mod functions;
mod model;
pub mod testing;

pub use config::{Config, EvaluatorConfig, FunctionsConfig};
pub use error::{Error, Result};
pub use evaluator::{EvalContext, Evaluator};
pub use expr::{Call, Expr};
pub use functions::{Function, FunctionRegistry};
pub use model::{FetchKey, FetchedData, Series};
