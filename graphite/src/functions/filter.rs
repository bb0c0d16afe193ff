//! Functions filtering samples or selecting among series.

use std::cmp::Ordering;
use std::sync::Arc;

use super::args::{count_arg, float_arg, map_samples, series_arg};
use super::{Function, FunctionRegistry};
use crate::error::Result;
use crate::evaluator::EvalContext;
use crate::expr::Call;
use crate::model::Series;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert_builtin(
        &["removeBelowValue"],
        Arc::new(RemoveValues {
            keep: |v, n| v >= n,
        }),
    );
    registry.insert_builtin(
        &["removeAboveValue"],
        Arc::new(RemoveValues {
            keep: |v, n| v <= n,
        }),
    );
    registry.insert_builtin(&["highestMax"], Arc::new(HighestMax));
    registry.insert_builtin(&["limit"], Arc::new(Limit));
    registry.insert_builtin(&["fallbackSeries"], Arc::new(FallbackSeries));
}

/// `removeBelowValue(series, n)` / `removeAboveValue(series, n)`: marks
/// samples on the wrong side of `n` absent.
struct RemoveValues {
    keep: fn(f64, f64) -> bool,
}

impl Function for RemoveValues {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let threshold = float_arg(call, 1)?;
        map_samples(call, ctx, |v| v.filter(|&v| (self.keep)(v, threshold)))
    }
}

/// `highestMax(series, n)`: the `n` series with the largest maximum, in
/// descending order. Series without any present non-NaN sample rank last.
/// The selected series are returned as they are.
struct HighestMax;

impl Function for HighestMax {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let n = count_arg(call, 1)?;
        let mut ranked: Vec<(Option<f64>, Arc<Series>)> = series_arg(call, ctx, 0)?
            .into_iter()
            .map(|s| (max_value(&s), s))
            .collect();
        // Stable, so ties keep their input order.
        ranked.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => b.total_cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(ranked.into_iter().take(n).map(|(_, s)| s).collect())
    }
}

/// Largest present sample, ignoring NaN. `None` when there is nothing to
/// rank by.
fn max_value(series: &Series) -> Option<f64> {
    series.present().filter(|v| !v.is_nan()).reduce(f64::max)
}

/// `limit(series, n)`: the first `n` series.
struct Limit;

impl Function for Limit {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let n = count_arg(call, 1)?;
        let mut series = series_arg(call, ctx, 0)?;
        series.truncate(n);
        Ok(series)
    }
}

/// `fallbackSeries(series, fallback)`: `series` if it produced anything,
/// otherwise `fallback`. The fallback is only evaluated when needed.
struct FallbackSeries;

impl Function for FallbackSeries {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let primary = series_arg(call, ctx, 0)?;
        if !primary.is_empty() {
            return Ok(primary);
        }
        series_arg(call, ctx, 1)
    }
}
