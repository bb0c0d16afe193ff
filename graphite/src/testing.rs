//! Helpers for testing Graphite functions.
//!
//! These check the contract every function must honour: fetched data is
//! left untouched, outputs have a step and unique names, and values match
//! the expected series within [`EPSILON`]. The `check_*` and `run_*`
//! helpers return `Err` with a readable message instead of panicking so
//! that table-driven tests can report which case failed.
//!
//! # Absent samples and NaN
//!
//! [`nearly_equal`] compares against plain `f64` expectations, where an
//! absent step is written as NaN. An expectation of a present NaN cannot be
//! expressed that way: NaN in `expected` always means absent, and a present
//! NaN in the actual series fails to match it. Use [`nearly_equal_series`]
//! when the expectation needs present NaNs.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::functions::{Function, FunctionRegistry};
use crate::model::{FetchedData, Series};

/// Tolerance for comparing present sample values.
pub const EPSILON: f64 = 1e-10;

/// Copies every series in `data` into fresh allocations.
///
/// A plain `clone` shares the series with the original, so it cannot serve
/// as a snapshot to detect modification.
pub fn deep_clone(data: &FetchedData) -> FetchedData {
    let mut clone = FetchedData::new();
    for (key, series) in data.iter() {
        clone.insert_shared(
            key.clone(),
            series.iter().map(|s| Arc::new(Series::clone(s))).collect(),
        );
    }
    clone
}

/// Checks that `data` still equals `snapshot`, taken with [`deep_clone`]
/// before evaluating `target`.
pub fn check_unmodified(
    target: &str,
    snapshot: &FetchedData,
    data: &FetchedData,
) -> Result<(), String> {
    for (key, original) in snapshot.iter() {
        let current = data.get(key).unwrap_or_default();
        if original.len() != current.len() {
            return Err(format!(
                "{}: source data was modified for {:?}: original length {}, new length {}",
                target,
                key,
                original.len(),
                current.len()
            ));
        }
        for (i, (before, after)) in original.iter().zip(current).enumerate() {
            if before != after {
                return Err(format!(
                    "{}: source data was modified for {:?} at index {}:\noriginal: {:?}\nmodified: {:?}",
                    target, key, i, before, after
                ));
            }
        }
    }
    Ok(())
}

/// Panics if `data` no longer equals `snapshot`.
#[track_caller]
pub fn assert_unmodified(target: &str, snapshot: &FetchedData, data: &FetchedData) {
    if let Err(message) = check_unmodified(target, snapshot, data) {
        panic!("{}", message);
    }
}

/// Whether `actual` matches `expected` step by step, where NaN in
/// `expected` stands for an absent step.
pub fn nearly_equal(actual: &Series, expected: &[f64]) -> bool {
    actual.len() == expected.len()
        && actual
            .samples()
            .iter()
            .zip(expected)
            .all(|(a, &e)| match a {
                None => e.is_nan(),
                Some(_) if e.is_nan() => false,
                Some(a) => (a - e).abs() <= EPSILON,
            })
}

/// Whether two series have the same absent steps and present values within
/// [`EPSILON`] of each other. Names and windows are not compared.
pub fn nearly_equal_series(a: &Series, b: &Series) -> bool {
    a.len() == b.len()
        && a.samples().iter().zip(b.samples()).all(|(a, b)| match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b || (a - b).abs() <= EPSILON,
            _ => false,
        })
}

/// An evaluator that knows only `function`, registered as `name`.
pub fn evaluator_for(name: &str, function: Arc<dyn Function>) -> Evaluator {
    let mut registry = FunctionRegistry::new();
    registry.insert_builtin(&[name], function);
    Evaluator::new(Arc::new(registry))
}

/// A target evaluated against fixture data, with the series it must
/// produce in order.
#[derive(Debug, Clone)]
pub struct EvalTestCase {
    pub expr: Expr,
    pub data: FetchedData,
    pub from: i64,
    pub until: i64,
    pub want: Vec<Series>,
}

impl EvalTestCase {
    /// A case over the window `[0, 1)`, the window fixtures are usually
    /// stored under.
    pub fn new(expr: Expr, data: FetchedData, want: Vec<Series>) -> Self {
        Self {
            expr,
            data,
            from: 0,
            until: 1,
            want,
        }
    }
}

/// Evaluates `case` and compares the result with `case.want`.
///
/// Names must match exactly and values within [`EPSILON`]. The fixture data
/// must come out of evaluation unmodified.
pub fn run_eval_test(evaluator: &Evaluator, case: &EvalTestCase) -> Result<(), String> {
    let target = case.expr.to_string();
    let snapshot = deep_clone(&case.data);
    let result = evaluator
        .evaluate(&case.expr, case.from, case.until, &case.data)
        .map_err(|err| format!("failed to eval {}: {}", target, err))?;

    if result.len() != case.want.len() {
        return Err(format!(
            "{} returned a different number of series: got {}, want {}",
            target,
            result.len(),
            case.want.len()
        ));
    }
    check_unmodified(&target, &snapshot, &case.data)?;

    for (i, (actual, want)) in result.iter().zip(&case.want).enumerate() {
        if actual.step_time() == 0 {
            return Err(format!("{}: series {} has no step", target, actual.name()));
        }
        if actual.name() != want.name() {
            return Err(format!(
                "{}: bad name for series {}: got {}, want {}",
                target,
                i,
                actual.name(),
                want.name()
            ));
        }
        if !nearly_equal_series(actual, want) {
            return Err(format!(
                "{}: different values for {}: got {:?}, want {:?}",
                target,
                actual.name(),
                actual.samples(),
                want.samples()
            ));
        }
    }
    Ok(())
}

/// A target producing several series, checked by name regardless of order.
#[derive(Debug, Clone)]
pub struct MultiReturnTestCase {
    pub name: String,
    pub expr: Expr,
    pub data: FetchedData,
    pub results: BTreeMap<String, Series>,
}

/// Evaluates `case` over `[0, 1)` and checks that it returns exactly the
/// series in `case.results`.
///
/// Each returned series must match its expectation exactly, window
/// included.
pub fn run_multi_return_test(evaluator: &Evaluator, case: &MultiReturnTestCase) -> Result<(), String> {
    let snapshot = deep_clone(&case.data);
    let result = evaluator
        .evaluate(&case.expr, 0, 1, &case.data)
        .map_err(|err| format!("failed to eval {}: {}", case.name, err))?;
    check_unmodified(&case.name, &snapshot, &case.data)?;

    if result.is_empty() {
        return Err(format!("{} returned no data", case.name));
    }
    if result.len() != case.results.len() {
        return Err(format!(
            "{}: unexpected number of results: got {}, want {}",
            case.name,
            result.len(),
            case.results.len()
        ));
    }
    for actual in &result {
        if actual.step_time() == 0 {
            return Err(format!("{}: series {} has no step", case.name, actual.name()));
        }
        let want = case
            .results
            .get(actual.name())
            .ok_or_else(|| format!("{}: unexpected result name {}", case.name, actual.name()))?;
        if **actual != *want {
            return Err(format!(
                "{}: result mismatch, got\n{:?}\nwant\n{:?}",
                case.name, actual, want
            ));
        }
    }
    Ok(())
}
