//! Functions transforming each input series independently.
//!
//! Every series produced by the first argument yields exactly one output
//! series on the same window, named `function(series,args...)`. A glob
//! argument therefore expands into one uniquely named output per match.

use std::sync::Arc;

use super::args::{float_arg, map_samples, map_series, optional_count_arg, optional_float_arg};
use super::{Function, FunctionRegistry};
use crate::error::Result;
use crate::evaluator::EvalContext;
use crate::expr::Call;
use crate::model::Series;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert_builtin(&["scale"], Arc::new(Scale));
    registry.insert_builtin(&["offset"], Arc::new(Offset));
    registry.insert_builtin(&["absolute"], Arc::new(Absolute));
    registry.insert_builtin(&["transformNull"], Arc::new(TransformNull));
    registry.insert_builtin(&["keepLastValue"], Arc::new(KeepLastValue));
    registry.insert_builtin(
        &["derivative"],
        Arc::new(Derivative {
            non_negative: false,
            per_second: false,
        }),
    );
    registry.insert_builtin(
        &["nonNegativeDerivative"],
        Arc::new(Derivative {
            non_negative: true,
            per_second: false,
        }),
    );
    registry.insert_builtin(
        &["perSecond"],
        Arc::new(Derivative {
            non_negative: true,
            per_second: true,
        }),
    );
    registry.insert_builtin(&["integral"], Arc::new(Integral));
}

/// `scale(series, factor)`: multiplies every present sample.
struct Scale;

impl Function for Scale {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let factor = float_arg(call, 1)?;
        map_samples(call, ctx, |v| v.map(|v| v * factor))
    }
}

/// `offset(series, amount)`: adds to every present sample.
struct Offset;

impl Function for Offset {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let amount = float_arg(call, 1)?;
        map_samples(call, ctx, |v| v.map(|v| v + amount))
    }
}

struct Absolute;

impl Function for Absolute {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        map_samples(call, ctx, |v| v.map(f64::abs))
    }
}

/// `transformNull(series, default=0)`: replaces absent samples.
struct TransformNull;

impl Function for TransformNull {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let default = optional_float_arg(call, 1, 0.0)?;
        map_samples(call, ctx, |v| Some(v.unwrap_or(default)))
    }
}

/// `keepLastValue(series, limit)`: fills gaps of at most `limit` absent
/// samples with the last present value. Leading gaps have no value to
/// repeat and stay absent.
struct KeepLastValue;

impl Function for KeepLastValue {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let limit = optional_count_arg(call, 1, usize::MAX)?;
        map_series(call, ctx, |s| keep_last_value(s.samples(), limit))
    }
}

fn keep_last_value(samples: &[Option<f64>], limit: usize) -> Vec<Option<f64>> {
    let mut out = samples.to_vec();
    let mut last = None;
    let mut gap_start = None;

    for i in 0..=samples.len() {
        match samples.get(i).copied().flatten() {
            None if i < samples.len() => {
                gap_start.get_or_insert(i);
            }
            current => {
                if let (Some(start), Some(value)) = (gap_start.take(), last) {
                    if i - start <= limit {
                        out[start..i].fill(Some(value));
                    }
                }
                if current.is_some() {
                    last = current;
                }
            }
        }
    }
    out
}

/// `derivative`, `nonNegativeDerivative` and `perSecond`.
///
/// The first step has no predecessor and is absent, as is any step where
/// either sample is absent. The non-negative variants treat a decrease as
/// a counter reset and mark that step absent.
struct Derivative {
    non_negative: bool,
    per_second: bool,
}

impl Function for Derivative {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        map_series(call, ctx, |s| {
            let step = s.step_time() as f64;
            let mut prev = None;
            s.samples()
                .iter()
                .map(|&current| {
                    let delta = match (prev, current) {
                        (Some(p), Some(c)) => Some(c - p),
                        _ => None,
                    };
                    prev = current;
                    let delta = delta.filter(|d| !self.non_negative || *d >= 0.0)?;
                    Some(if self.per_second { delta / step } else { delta })
                })
                .collect()
        })
    }
}

/// `integral(series)`: running total of present samples.
struct Integral;

impl Function for Integral {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        map_series(call, ctx, |s| {
            let mut total = 0.0;
            s.samples()
                .iter()
                .map(|v| {
                    v.map(|v| {
                        total += v;
                        total
                    })
                })
                .collect()
        })
    }
}
