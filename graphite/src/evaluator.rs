//! Recursive evaluation of Graphite expressions against fetched data.
//!
//! The [`Evaluator`] resolves metric names against a [`FetchedData`] set,
//! synthesizes constants, and dispatches calls to the functions of a
//! [`FunctionRegistry`]. Functions receive an [`EvalContext`] and evaluate
//! their own arguments through it, so they decide evaluation order and may
//! skip arguments entirely.
//!
//! Evaluation is synchronous and never mutates its inputs. An evaluator is
//! `Send + Sync` and may be shared between threads evaluating independent
//! requests, including requests reading the same fetched-data set.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, EvaluatorConfig};
use crate::error::{Error, Result};
use crate::expr::{Call, Expr, format_constant};
use crate::functions::FunctionRegistry;
use crate::model::{FetchKey, FetchedData, Series};

/// Evaluates expression trees using a fixed function registry.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use graphite::{Evaluator, Expr, FetchedData, FunctionRegistry, Series};
///
/// let mut data = FetchedData::new();
/// data.insert("a", 0, 1, vec![Series::from_values("a", 0, 1, &[1.0])]);
/// data.insert("b", 0, 1, vec![Series::from_values("b", 0, 1, &[2.0])]);
///
/// let evaluator = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()));
/// let expr = Expr::call("sumSeries", vec![Expr::name("a"), Expr::name("b")]);
/// let result = evaluator.evaluate(&expr, 0, 1, &data).unwrap();
///
/// assert_eq!(result.len(), 1);
/// assert_eq!(result[0].name(), "sumSeries(a,b)");
/// assert_eq!(result[0].samples(), &[Some(3.0)]);
/// ```
#[derive(Clone)]
pub struct Evaluator {
    registry: Arc<FunctionRegistry>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self::with_config(registry, EvaluatorConfig::default())
    }

    pub fn with_config(registry: Arc<FunctionRegistry>, config: EvaluatorConfig) -> Self {
        Self { registry, config }
    }

    /// Builds an evaluator over the builtin functions, customised by
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = FunctionRegistry::from_config(&config.functions)?;
        Ok(Self::with_config(
            Arc::new(registry),
            config.evaluator.clone(),
        ))
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluates `expr` over the window `[from, until)`.
    ///
    /// Metric names resolve to the series stored in `data` under the same
    /// pattern and window; a name with no entry evaluates to an empty list.
    /// Returned series are shared with `data` wherever a function passed
    /// them through unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidWindow`] if `until <= from`, or if the window is
    ///   too wide for its length to fit in an `i64`.
    /// - [`Error::MissingArgument`] for a call without arguments.
    /// - [`Error::UnknownFunction`] for a call to an unregistered name.
    /// - [`Error::InvalidOutput`] if a node returns a series with a zero
    ///   step or duplicate series names.
    /// - [`Error::DepthExceeded`] if the tree is nested too deeply.
    /// - Any error raised by a function, unchanged.
    #[tracing::instrument(level = "trace", skip_all, fields(expr = %expr, from = from, until = until))]
    pub fn evaluate(
        &self,
        expr: &Expr,
        from: i64,
        until: i64,
        data: &FetchedData,
    ) -> Result<Vec<Arc<Series>>> {
        // The span becomes the step of constant series, so it must be
        // positive and representable.
        if until.checked_sub(from).is_none_or(|span| span <= 0) {
            return Err(Error::InvalidWindow { from, until });
        }

        let root = EvalContext {
            evaluator: self,
            from,
            until,
            data,
            depth: 0,
        };
        root.eval(expr).inspect_err(|err| {
            tracing::debug!(expr = %expr, error = %err, "evaluation failed");
        })
    }

    fn eval_node(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        match expr {
            Expr::Name(pattern) => {
                let key = FetchKey::new(pattern.as_str(), ctx.from, ctx.until);
                Ok(ctx.data.get(&key).map(|s| s.to_vec()).unwrap_or_default())
            }
            Expr::Constant(value) => Ok(vec![Arc::new(constant_series(
                *value, ctx.from, ctx.until,
            ))]),
            Expr::Call(call) => self.eval_call(call, ctx),
        }
    }

    fn eval_call(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
        // Every Graphite function takes at least one argument.
        if call.args().is_empty() {
            return Err(Error::MissingArgument {
                function: call.name().to_string(),
            });
        }

        let function = self
            .registry
            .get(call.name())
            .ok_or_else(|| Error::UnknownFunction(call.name().to_string()))?;

        tracing::trace!(call = %call, depth = ctx.depth, "dispatching function");
        function.evaluate(call, ctx).inspect_err(|err| {
            tracing::debug!(call = %call, error = %err, "function failed");
        })
    }
}

/// The view of an evaluation a function receives.
///
/// It carries the evaluation window, read-only access to the fetched data,
/// and the entry point for evaluating child expressions.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    evaluator: &'a Evaluator,
    from: i64,
    until: i64,
    data: &'a FetchedData,
    depth: usize,
}

impl<'a> EvalContext<'a> {
    /// Start of the evaluation window (inclusive, Unix seconds).
    pub fn from(&self) -> i64 {
        self.from
    }

    /// End of the evaluation window (exclusive, Unix seconds).
    pub fn until(&self) -> i64 {
        self.until
    }

    pub fn data(&self) -> &'a FetchedData {
        self.data
    }

    /// Evaluates a child expression over the same window and data.
    ///
    /// The result has already been checked against the output contract.
    pub fn eval(&self, expr: &Expr) -> Result<Vec<Arc<Series>>> {
        let depth = self.depth + 1;
        let max_depth = self.evaluator.config.max_depth;
        if depth > max_depth {
            return Err(Error::DepthExceeded { max_depth });
        }

        let child = EvalContext { depth, ..*self };
        let result = self.evaluator.eval_node(expr, &child)?;
        validate_output(expr, &result)?;
        Ok(result)
    }
}

/// A literal spans the whole window as a single step.
fn constant_series(value: f64, from: i64, until: i64) -> Series {
    Series::new(format_constant(value), from, until - from, vec![Some(value)])
}

fn validate_output(expr: &Expr, series: &[Arc<Series>]) -> Result<()> {
    let mut names = HashSet::with_capacity(series.len());
    for s in series {
        if s.step_time() == 0 {
            return Err(Error::InvalidOutput {
                target: expr.to_string(),
                message: format!("series {} has a zero step", s.name()),
            });
        }
        if !names.insert(s.name()) {
            return Err(Error::InvalidOutput {
                target: expr.to_string(),
                message: format!("duplicate series name {}", s.name()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Function;
    use rstest::rstest;

    /// Returns whatever series it was built with, ignoring its arguments.
    struct Fixed(Vec<Series>);

    impl Function for Fixed {
        fn evaluate(&self, _call: &Call, _ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
            Ok(self.0.iter().cloned().map(Arc::new).collect())
        }
    }

    /// Evaluates its first argument and passes the result through.
    struct Identity;

    impl Function for Identity {
        fn evaluate(&self, call: &Call, ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
            ctx.eval(&call.args()[0])
        }
    }

    fn evaluator_with(name: &str, function: impl Function + 'static) -> Evaluator {
        let mut registry = FunctionRegistry::new();
        registry.register(name, Arc::new(function)).unwrap();
        Evaluator::new(Arc::new(registry))
    }

    fn fetched(pattern: &str, values: &[f64]) -> FetchedData {
        let mut data = FetchedData::new();
        data.insert(
            pattern,
            0,
            1,
            vec![Series::from_values(pattern, 0, 1, values)],
        );
        data
    }

    #[test]
    fn should_return_fetched_series_by_reference() {
        // given
        let data = fetched("metric", &[1.0, 2.0]);
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let result = evaluator
            .evaluate(&Expr::name("metric"), 0, 1, &data)
            .unwrap();

        // then
        let stored = &data.get(&FetchKey::new("metric", 0, 1)).unwrap()[0];
        assert_eq!(result.len(), 1);
        assert!(Arc::ptr_eq(&result[0], stored));
    }

    #[test]
    fn should_return_empty_list_on_fetch_miss() {
        // given
        let data = fetched("metric", &[1.0]);
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let other_name = evaluator.evaluate(&Expr::name("other"), 0, 1, &data);
        let other_window = evaluator.evaluate(&Expr::name("metric"), 0, 2, &data);

        // then
        assert!(other_name.unwrap().is_empty());
        assert!(other_window.unwrap().is_empty());
    }

    #[test]
    fn should_synthesize_constant_spanning_window() {
        // given
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let result = evaluator
            .evaluate(&Expr::constant(42.0), 100, 160, &FetchedData::new())
            .unwrap();

        // then
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name(), "42");
        assert_eq!(result[0].samples(), &[Some(42.0)]);
        assert_eq!(result[0].start_time(), 100);
        assert_eq!(result[0].stop_time(), 160);
        assert_eq!(result[0].step_time(), 60);
    }

    #[rstest]
    #[case("sumSeries")]
    #[case("identity")]
    #[case("doesNotExist")]
    fn should_reject_call_without_arguments(#[case] name: &str) {
        // given
        let evaluator = evaluator_with("identity", Identity);

        // when
        let result = evaluator.evaluate(&Expr::call(name, vec![]), 0, 1, &FetchedData::new());

        // then
        assert_eq!(
            result,
            Err(Error::MissingArgument {
                function: name.to_string()
            })
        );
    }

    #[test]
    fn should_reject_unknown_function() {
        // given
        let evaluator = evaluator_with("identity", Identity);
        let expr = Expr::call("doesNotExist", vec![Expr::name("metric")]);

        // when
        let result = evaluator.evaluate(&expr, 0, 1, &fetched("metric", &[1.0]));

        // then
        assert_eq!(
            result,
            Err(Error::UnknownFunction("doesNotExist".to_string()))
        );
    }

    #[test]
    fn should_propagate_function_errors_unchanged() {
        // given
        struct Failing;
        impl Function for Failing {
            fn evaluate(&self, call: &Call, _ctx: &EvalContext<'_>) -> Result<Vec<Arc<Series>>> {
                Err(Error::invalid_argument(call.name(), "always fails"))
            }
        }
        let mut registry = FunctionRegistry::new();
        registry.register("failing", Arc::new(Failing)).unwrap();
        registry.register("identity", Arc::new(Identity)).unwrap();
        let evaluator = Evaluator::new(Arc::new(registry));
        let expr = Expr::call(
            "identity",
            vec![Expr::call("failing", vec![Expr::name("metric")])],
        );

        // when
        let result = evaluator.evaluate(&expr, 0, 1, &FetchedData::new());

        // then
        assert_eq!(
            result,
            Err(Error::InvalidArgument {
                function: "failing".to_string(),
                message: "always fails".to_string(),
            })
        );
    }

    #[test]
    fn should_reject_zero_step_output() {
        // given
        let evaluator = evaluator_with(
            "broken",
            Fixed(vec![Series::new("broken", 0, 0, vec![Some(1.0)])]),
        );

        // when
        let result = evaluator.evaluate(
            &Expr::call("broken", vec![Expr::name("x")]),
            0,
            1,
            &FetchedData::new(),
        );

        // then
        assert!(
            matches!(result, Err(Error::InvalidOutput { ref message, .. }) if message.contains("zero step")),
            "unexpected result: {:?}",
            result
        );
    }

    #[test]
    fn should_reject_duplicate_output_names() {
        // given
        let evaluator = evaluator_with(
            "dup",
            Fixed(vec![
                Series::from_values("same", 0, 1, &[1.0]),
                Series::from_values("same", 0, 1, &[2.0]),
            ]),
        );

        // when
        let result = evaluator.evaluate(
            &Expr::call("dup", vec![Expr::name("x")]),
            0,
            1,
            &FetchedData::new(),
        );

        // then
        assert!(matches!(result, Err(Error::InvalidOutput { ref target, .. }) if target == "dup(x)"));
    }

    #[test]
    fn should_not_reorder_or_rename_function_output() {
        // given
        let evaluator = evaluator_with(
            "fixed",
            Fixed(vec![
                Series::from_values("z", 0, 1, &[1.0]),
                Series::from_values("a", 0, 1, &[2.0]),
            ]),
        );

        // when
        let result = evaluator
            .evaluate(
                &Expr::call("fixed", vec![Expr::name("x")]),
                0,
                1,
                &FetchedData::new(),
            )
            .unwrap();

        // then
        let names: Vec<&str> = result.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[rstest]
    #[case(10, 10)]
    #[case(10, 5)]
    fn should_reject_empty_or_inverted_window(#[case] from: i64, #[case] until: i64) {
        // given
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let result = evaluator.evaluate(&Expr::name("metric"), from, until, &FetchedData::new());

        // then
        assert_eq!(result, Err(Error::InvalidWindow { from, until }));
    }

    #[rstest]
    #[case(i64::MIN, i64::MAX)]
    #[case(-1, i64::MAX)]
    #[case(i64::MIN, 1)]
    fn should_reject_window_wider_than_i64(#[case] from: i64, #[case] until: i64) {
        // given
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let result = evaluator.evaluate(&Expr::constant(1.0), from, until, &FetchedData::new());

        // then
        assert_eq!(result, Err(Error::InvalidWindow { from, until }));
    }

    #[test]
    fn should_accept_widest_representable_window() {
        // given
        let evaluator = Evaluator::new(Arc::new(FunctionRegistry::new()));

        // when
        let result = evaluator
            .evaluate(&Expr::constant(1.0), 0, i64::MAX, &FetchedData::new())
            .unwrap();

        // then
        assert_eq!(result[0].step_time(), i64::MAX);
        assert_eq!(result[0].stop_time(), i64::MAX);
    }

    #[test]
    fn should_bound_recursion_depth() {
        // given
        let mut registry = FunctionRegistry::new();
        registry.register("identity", Arc::new(Identity)).unwrap();
        let evaluator =
            Evaluator::with_config(Arc::new(registry), EvaluatorConfig { max_depth: 3 });
        let mut expr = Expr::name("metric");
        for _ in 0..3 {
            expr = Expr::call("identity", vec![expr]);
        }
        let data = fetched("metric", &[1.0]);

        // when
        let too_deep = evaluator.evaluate(&expr, 0, 1, &data);
        let shallow = evaluator.evaluate(&Expr::call("identity", vec![Expr::name("metric")]), 0, 1, &data);

        // then
        assert_eq!(too_deep, Err(Error::DepthExceeded { max_depth: 3 }));
        assert_eq!(shallow.unwrap().len(), 1);
    }

    #[test]
    fn should_build_from_config() {
        // given
        let config = Config::from_toml(
            r#"
            [evaluator]
            max_depth = 8

            [functions.aliases]
            total = "sumSeries"
            "#,
        )
        .unwrap();

        // when
        let evaluator = Evaluator::from_config(&config).unwrap();
        let expr = Expr::call("total", vec![Expr::name("metric")]);
        let result = evaluator
            .evaluate(&expr, 0, 1, &fetched("metric", &[1.0, 2.0]))
            .unwrap();

        // then
        assert_eq!(evaluator.config().max_depth, 8);
        assert_eq!(result[0].name(), "total(metric)");
    }
}
