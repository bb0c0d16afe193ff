//! Moving-window functions.

use std::sync::Arc;

use super::aggregate::{average, sum};
use super::args::{count_arg, map_series};
use super::{Function, FunctionRegistry};
use crate::error::{Error, Result};
use crate::evaluator::EvalContext;
use crate::expr::Call;
use crate::model::Series;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert_builtin(
        &["movingAverage"],
        Arc::new(MovingWindow {
            reduce: WindowReduce::Average,
        }),
    );
    registry.insert_builtin(
        &["movingSum"],
        Arc::new(MovingWindow {
            reduce: WindowReduce::Sum,
        }),
    );
}

#[derive(Debug, Clone, Copy)]
enum WindowReduce {
    Average,
    Sum,
}

/// `movingAverage(series, points)` and `movingSum(series, points)`.
///
/// The window trails each step and covers at most `points` samples,
/// fewer at the start of the series. Absent samples inside the window are
/// ignored; a window without any present sample produces an absent step.
/// Every window is summed afresh with compensated summation, so no error
/// carries over from one step to the next.
struct MovingWindow {
    reduce: WindowReduce,
}

impl Function for MovingWindow {
    fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        let points = count_arg(call, 1)?;
        if points == 0 {
            return Err(Error::invalid_argument(
                call.name(),
                "window must hold at least one point",
            ));
        }
        map_series(call, ctx, |s| moving(s.samples(), points, self.reduce))
    }
}

fn moving(samples: &[Option<f64>], points: usize, reduce: WindowReduce) -> Vec<Option<f64>> {
    let mut values: Vec<f64> = Vec::with_capacity(points.min(samples.len()));
    (0..samples.len())
        .map(|i| {
            let window = &samples[(i + 1).saturating_sub(points)..=i];
            values.clear();
            values.extend(window.iter().flatten().copied());
            if values.is_empty() {
                return None;
            }
            Some(match reduce {
                WindowReduce::Sum => sum(&values),
                WindowReduce::Average => average(&values),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::expr::Expr;
    use crate::model::FetchedData;
    use rstest::rstest;

    #[rstest]
    #[case(WindowReduce::Sum, 1, vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)])]
    #[case(WindowReduce::Sum, 2, vec![Some(1.0), Some(3.0), Some(2.0), Some(4.0), Some(9.0)])]
    #[case(WindowReduce::Sum, 3, vec![Some(1.0), Some(3.0), Some(3.0), Some(6.0), Some(9.0)])]
    #[case(WindowReduce::Average, 2, vec![Some(1.0), Some(1.5), Some(2.0), Some(4.0), Some(4.5)])]
    #[case(WindowReduce::Average, 3, vec![Some(1.0), Some(1.5), Some(1.5), Some(3.0), Some(4.5)])]
    fn should_reduce_trailing_window(
        #[case] reduce: WindowReduce,
        #[case] points: usize,
        #[case] expected: Vec<Option<f64>>,
    ) {
        // given
        let samples = [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];

        // when
        let result = moving(&samples, points, reduce);

        // then
        assert_eq!(result, expected);
    }

    #[rstest]
    #[case(
        WindowReduce::Sum,
        vec![Some(1e16), Some(1.0), None],
        vec![Some(1e16), Some(1e16), Some(1.0)]
    )]
    #[case(
        WindowReduce::Sum,
        vec![Some(1e100), Some(1.0), Some(-1e100), Some(1.0), None, None],
        vec![Some(1e100), Some(1e100), Some(-1e100), Some(-1e100), Some(1.0), None]
    )]
    #[case(
        WindowReduce::Average,
        vec![Some(1e16), Some(2.0), None, Some(4.0)],
        vec![Some(1e16), Some(5e15 + 1.0), Some(2.0), Some(4.0)]
    )]
    fn should_not_carry_cancellation_error_between_windows(
        #[case] reduce: WindowReduce,
        #[case] samples: Vec<Option<f64>>,
        #[case] expected: Vec<Option<f64>>,
    ) {
        // when
        let result = moving(&samples, 2, reduce);

        // then
        assert_eq!(result, expected);
    }

    #[test]
    fn should_leave_all_absent_window_absent() {
        // when
        let result = moving(&[Some(1.0), None, None, Some(2.0)], 2, WindowReduce::Average);

        // then
        assert_eq!(result, vec![Some(1.0), Some(1.0), None, Some(2.0)]);
    }

    #[test]
    fn should_reject_empty_window() {
        // given
        let mut data = FetchedData::new();
        data.insert("m", 0, 1, vec![Series::from_values("m", 0, 1, &[1.0])]);
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()));
        let expr = Expr::call("movingAverage", vec![Expr::name("m"), Expr::constant(0.0)]);

        // when
        let result = evaluator.evaluate(&expr, 0, 1, &data);

        // then
        assert!(matches!(
            result,
            Err(Error::InvalidArgument { ref function, .. }) if function == "movingAverage"
        ));
    }

    #[test]
    fn should_name_output_with_window_size() {
        // given
        let mut data = FetchedData::new();
        data.insert("m", 0, 1, vec![Series::from_values("m", 0, 1, &[1.0, 3.0])]);
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()));
        let expr = Expr::call("movingSum", vec![Expr::name("m"), Expr::constant(2.0)]);

        // when
        let result = evaluator.evaluate(&expr, 0, 1, &data).unwrap();

        // then
        assert_eq!(result[0].name(), "movingSum(m,2)");
        assert_eq!(result[0].samples(), &[Some(1.0), Some(4.0)]);
    }
}
