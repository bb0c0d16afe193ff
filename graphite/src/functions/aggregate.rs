//! Functions combining several series into one.
//!
//! Each of these evaluates all of its arguments as series (see
//! [`series_list_args`]), aligns them onto a common step, and reduces every
//! step to a single value. The output is named after the call as written,
//! e.g. `sumSeries(servers.*.cpu)`.

use std::sync::Arc;

use super::args::{align, series_list_args};
use super::{Function, FunctionRegistry};
use crate::error::Result;
use crate::evaluator::EvalContext;
use crate::expr::Call;
use crate::model::Series;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert_builtin(
        &["sumSeries", "sum"],
        Arc::new(SeriesAggregate::strict(sum)),
    );
    registry.insert_builtin(&["diffSeries"], Arc::new(SeriesAggregate::strict(diff)));
    registry.insert_builtin(
        &["multiplySeries"],
        Arc::new(SeriesAggregate::strict(multiply)),
    );
    registry.insert_builtin(
        &["averageSeries", "avg"],
        Arc::new(SeriesAggregate::skipping_absent(average)),
    );
    registry.insert_builtin(&["maxSeries"], Arc::new(SeriesAggregate::skipping_absent(max)));
    registry.insert_builtin(&["minSeries"], Arc::new(SeriesAggregate::skipping_absent(min)));
}

/// How absent samples at a step affect the combined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbsentPolicy {
    /// A step absent in any input is absent in the output.
    Propagate,
    /// Absent inputs are ignored; the output is absent only if every input
    /// is absent.
    Skip,
}

/// Reduces aligned series step by step with `reduce`.
struct SeriesAggregate {
    policy: AbsentPolicy,
    reduce: fn(&[f64]) -> f64,
}

impl SeriesAggregate {
    fn strict(reduce: fn(&[f64]) -> f64) -> Self {
        Self {
            policy: AbsentPolicy::Propagate,
            reduce,
        }
    }

    fn skipping_absent(reduce: fn(&[f64]) -> f64) -> Self {
        Self {
            policy: AbsentPolicy::Skip,
            reduce,
        }
    }
}

impl Function for SeriesAggregate {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let series = series_list_args(call, ctx)?;
        if series.is_empty() {
            return Ok(vec![]);
        }

        let aligned = align(call.name(), &series)?;
        let mut values = Vec::with_capacity(series.len());
        let samples = (0..aligned.len())
            .map(|i| {
                values.clear();
                for sample in aligned.column(i) {
                    match (sample, self.policy) {
                        (Some(v), _) => values.push(v),
                        (None, AbsentPolicy::Propagate) => return None,
                        (None, AbsentPolicy::Skip) => {}
                    }
                }
                (!values.is_empty()).then(|| (self.reduce)(&values))
            })
            .collect();

        Ok(vec![Arc::new(aligned.to_series(call.to_string(), samples))])
    }
}

/// Kahan summation increment with Neumaier improvement (1974)
///
/// Returns (new_sum, new_compensation)
#[inline(never)]
// Compiler reordering of floating-point operations can cause precision loss.
fn kahan_inc(inc: f64, sum: f64, c: f64) -> (f64, f64) {
    let t = sum + inc;

    let new_c = if t.is_infinite() {
        0.0
    } else if sum.abs() >= inc.abs() {
        c + ((sum - t) + inc)
    } else {
        c + ((inc - t) + sum)
    };

    (t, new_c)
}

pub(super) fn sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut c = 0.0;
    for &v in values {
        (sum, c) = kahan_inc(v, sum, c);
    }
    if sum.is_infinite() { sum } else { sum + c }
}

/// The first value minus all the others.
fn diff(values: &[f64]) -> f64 {
    match values.split_first() {
        Some((first, rest)) => first - sum(rest),
        None => f64::NAN,
    }
}

fn multiply(values: &[f64]) -> f64 {
    values.iter().product()
}

pub(super) fn average(values: &[f64]) -> f64 {
    sum(values) / values.len() as f64
}

// Explicit comparisons rather than f64::max so a real value replaces a
// leading NaN while all-NaN input stays NaN.
fn max(values: &[f64]) -> f64 {
    let mut max_val = values[0];
    for &cur in &values[1..] {
        if cur > max_val || max_val.is_nan() {
            max_val = cur;
        }
    }
    max_val
}

fn min(values: &[f64]) -> f64 {
    let mut min_val = values[0];
    for &cur in &values[1..] {
        if cur < min_val || min_val.is_nan() {
            min_val = cur;
        }
    }
    min_val
}
