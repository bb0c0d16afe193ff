//! Helpers for reading call arguments and aligning series.
//!
//! These are the building blocks builtin functions are written with, and
//! are public so that externally registered functions can share the same
//! argument conventions and error messages.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::evaluator::EvalContext;
use crate::expr::{Call, Expr, format_constant};
use crate::model::Series;

/// Evaluates argument `index` as a series list.
pub fn series_arg(call: &Call, ctx: &EvalContext<'_>, index: usize) -> Result<Vec<Arc<Series>>> {
    let arg = call
        .arg(index)
        .ok_or_else(|| missing_positional(call, index))?;
    ctx.eval(arg)
}

/// Reads argument `index` as a numeric literal.
pub fn float_arg(call: &Call, index: usize) -> Result<f64> {
    match call.arg(index) {
        Some(Expr::Constant(value)) => Ok(*value),
        Some(other) => Err(Error::invalid_argument(
            call.name(),
            format!("argument {} must be a number, got {}", index + 1, other),
        )),
        None => Err(missing_positional(call, index)),
    }
}

/// Reads argument `index` as a numeric literal, or `default` when the call
/// has fewer arguments.
pub fn optional_float_arg(call: &Call, index: usize, default: f64) -> Result<f64> {
    if call.arg(index).is_none() {
        return Ok(default);
    }
    float_arg(call, index)
}

/// Reads argument `index` as a non-negative integer.
pub fn count_arg(call: &Call, index: usize) -> Result<usize> {
    let value = float_arg(call, index)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(Error::invalid_argument(
            call.name(),
            format!(
                "argument {} must be a non-negative integer, got {}",
                index + 1,
                format_constant(value)
            ),
        ));
    }
    Ok(value as usize)
}

/// Reads argument `index` as a non-negative integer, or `default` when the
/// call has fewer arguments.
pub fn optional_count_arg(call: &Call, index: usize, default: usize) -> Result<usize> {
    if call.arg(index).is_none() {
        return Ok(default);
    }
    count_arg(call, index)
}

fn missing_positional(call: &Call, index: usize) -> Error {
    Error::invalid_argument(
        call.name(),
        format!("expected at least {} arguments", index + 1),
    )
}

/// Name of a per-series output: the function applied to the series name
/// followed by the remaining arguments, e.g. `scale(servers.web1.cpu,2)`.
pub fn per_series_name(call: &Call, series: &Series) -> String {
    let mut name = format!("{}({}", call.name(), series.name());
    for arg in call.args().iter().skip(1) {
        name.push(',');
        name.push_str(&arg.to_string());
    }
    name.push(')');
    name
}

/// Evaluates the first argument and maps the samples of every resulting
/// series, naming outputs with [`per_series_name`].
pub fn map_series<F>(call: &Call, ctx: &EvalContext<'_>, mut f: F) -> Result<Vec<Arc<Series>>>
where
    F: FnMut(&Series) -> Vec<Option<f64>>,
{
    let input = series_arg(call, ctx, 0)?;
    Ok(input
        .iter()
        .map(|series| {
            let samples = f(series);
            Arc::new(series.with_samples(per_series_name(call, series), samples))
        })
        .collect())
}

/// Evaluates the first argument and maps every sample of every resulting
/// series on its own, naming outputs with [`per_series_name`].
pub fn map_samples<F>(call: &Call, ctx: &EvalContext<'_>, f: F) -> Result<Vec<Arc<Series>>>
where
    F: Fn(Option<f64>) -> Option<f64>,
{
    let input = series_arg(call, ctx, 0)?;
    Ok(input
        .iter()
        .map(|series| Arc::new(series.map_samples(per_series_name(call, series), &f)))
        .collect())
}

enum Operand {
    Series(Vec<Arc<Series>>),
    Constant(f64),
}

/// Evaluates every argument as series, for functions combining series.
///
/// Numeric literals have no step of their own. When the other arguments
/// produce series, a literal is broadcast onto their common step and
/// window; otherwise it evaluates to its single window-spanning sample.
pub fn series_list_args(call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
    let mut operands = Vec::with_capacity(call.args().len());
    for arg in call.args() {
        match arg {
            Expr::Constant(value) => operands.push(Operand::Constant(*value)),
            _ => operands.push(Operand::Series(ctx.eval(arg)?)),
        }
    }

    let evaluated: Vec<Arc<Series>> = operands
        .iter()
        .filter_map(|op| match op {
            Operand::Series(series) => Some(series.iter().cloned()),
            Operand::Constant(_) => None,
        })
        .flatten()
        .collect();
    let grid = if evaluated.is_empty() {
        None
    } else {
        Some(Grid::common(call.name(), &evaluated)?)
    };

    let mut result = Vec::with_capacity(evaluated.len() + operands.len());
    for (arg, op) in call.args().iter().zip(operands) {
        match (op, &grid) {
            (Operand::Series(series), _) => result.extend(series),
            (Operand::Constant(value), Some(grid)) => result.push(Arc::new(grid.broadcast(value))),
            (Operand::Constant(_), None) => result.extend(ctx.eval(arg)?),
        }
    }
    Ok(result)
}

/// Series resampled onto one step and window.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    pub start_time: i64,
    pub stop_time: i64,
    pub step_time: i64,
    /// One sample vector per input series, all of the same length.
    pub samples: Vec<Vec<Option<f64>>>,
}

impl Aligned {
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of every series at step `index`.
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        self.samples.iter().map(move |s| s[index])
    }

    /// Builds an output series on the aligned window.
    pub fn to_series(&self, name: impl Into<String>, samples: Vec<Option<f64>>) -> Series {
        Series::with_window(
            name,
            self.start_time,
            self.stop_time,
            self.step_time,
            samples,
        )
    }
}

/// Resamples `series` onto a common step and window.
///
/// The common step is the least common multiple of the input steps and the
/// window runs from the earliest start to the latest stop. Series with a
/// finer step are consolidated by averaging the present samples falling in
/// each coarser step; a step with no present sample stays absent.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] naming `function` if a series has a
/// non-positive step.
pub fn align(function: &str, series: &[Arc<Series>]) -> Result<Aligned> {
    let grid = Grid::common(function, series)?;
    Ok(Aligned {
        start_time: grid.start,
        stop_time: grid.stop,
        step_time: grid.step,
        samples: series.iter().map(|s| grid.consolidate(s)).collect(),
    })
}

struct Grid {
    start: i64,
    stop: i64,
    step: i64,
    len: usize,
}

impl Grid {
    fn common(function: &str, series: &[Arc<Series>]) -> Result<Self> {
        let mut step = 0;
        let mut start = i64::MAX;
        let mut stop = i64::MIN;
        for s in series {
            if s.step_time() <= 0 {
                return Err(Error::invalid_argument(
                    function,
                    format!("series {} has non-positive step {}", s.name(), s.step_time()),
                ));
            }
            step = lcm(step, s.step_time()).ok_or_else(|| {
                Error::invalid_argument(
                    function,
                    format!("series {} has no common step with the others", s.name()),
                )
            })?;
            start = start.min(s.start_time());
            stop = stop.max(s.stop_time());
        }
        if series.is_empty() || stop <= start {
            return Ok(Self {
                start: if series.is_empty() { 0 } else { start },
                stop: if series.is_empty() { 0 } else { start },
                step: step.max(1),
                len: 0,
            });
        }

        let too_wide = || {
            Error::invalid_argument(
                function,
                format!("window [{}, {}) at step {} is too wide", start, stop, step),
            )
        };
        let span = stop.checked_sub(start).ok_or_else(too_wide)?;
        let steps = span / step + i64::from(span % step != 0);
        let stop = steps
            .checked_mul(step)
            .and_then(|width| start.checked_add(width))
            .ok_or_else(too_wide)?;
        let len = usize::try_from(steps).map_err(|_| too_wide())?;
        Ok(Self {
            start,
            stop,
            step,
            len,
        })
    }

    fn broadcast(&self, value: f64) -> Series {
        Series::with_window(
            format_constant(value),
            self.start,
            self.stop,
            self.step,
            vec![Some(value); self.len],
        )
    }

    fn consolidate(&self, series: &Series) -> Vec<Option<f64>> {
        if series.step_time() == self.step
            && series.start_time() == self.start
            && series.len() == self.len
        {
            return series.samples().to_vec();
        }

        let mut sums = vec![0.0; self.len];
        let mut counts = vec![0usize; self.len];
        for (i, sample) in series.samples().iter().enumerate() {
            let Some(value) = sample else {
                continue;
            };
            let Some(bucket) = self.bucket(series, i) else {
                continue;
            };
            sums[bucket] += value;
            counts[bucket] += 1;
        }
        sums.into_iter()
            .zip(counts)
            .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
            .collect()
    }

    /// Index of the grid step holding sample `index` of `series`, if any.
    fn bucket(&self, series: &Series, index: usize) -> Option<usize> {
        let offset = i64::try_from(index).ok()?.checked_mul(series.step_time())?;
        let ts = series.start_time().checked_add(offset)?;
        let bucket = usize::try_from(ts.checked_sub(self.start)? / self.step).ok()?;
        (bucket < self.len).then_some(bucket)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple of two positive steps, `None` on overflow. A zero
/// `a` stands for "no step yet".
fn lcm(a: i64, b: i64) -> Option<i64> {
    if a == 0 {
        return Some(b);
    }
    (a / gcd(a, b)).checked_mul(b)
}
