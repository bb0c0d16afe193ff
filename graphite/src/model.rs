//! Core data types for Graphite expression evaluation.
//!
//! This module defines the time series flowing through the evaluator and
//! the fetched-data set evaluation reads from. Series are immutable once
//! built: transformations always allocate new series, and the fetched-data
//! set hands out shared, read-only handles.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A named, step-aligned sequence of samples over a time window.
///
/// Each step holds either a present value or an absent marker. Absence is
/// tagged explicitly (`None`) rather than encoded as NaN, so a present NaN
/// produced by arithmetic is never mistaken for missing data.
///
/// # Example
///
/// ```
/// use graphite::Series;
///
/// let series = Series::new("servers.web1.cpu", 0, 60, vec![Some(1.0), None, Some(3.0)]);
/// assert_eq!(series.stop_time(), 180);
/// assert_eq!(series.is_absent().collect::<Vec<_>>(), vec![false, true, false]);
/// ```
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    start_time: i64,
    stop_time: i64,
    step_time: i64,
    samples: Vec<Option<f64>>,
}

impl Series {
    /// Creates a series starting at `start_time` with one sample per step.
    ///
    /// The stop time is derived as `start_time + len * step_time`, clamped
    /// to the `i64` range.
    pub fn new(
        name: impl Into<String>,
        start_time: i64,
        step_time: i64,
        samples: Vec<Option<f64>>,
    ) -> Self {
        let span = i64::try_from(samples.len())
            .unwrap_or(i64::MAX)
            .saturating_mul(step_time);
        let stop_time = start_time.saturating_add(span);
        Self {
            name: name.into(),
            start_time,
            stop_time,
            step_time,
            samples,
        }
    }

    /// Creates a series with an explicit stop time.
    ///
    /// Backends do not always report a stop time that is an exact multiple
    /// of the step past the start, so the window is taken as given.
    pub fn with_window(
        name: impl Into<String>,
        start_time: i64,
        stop_time: i64,
        step_time: i64,
        samples: Vec<Option<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            start_time,
            stop_time,
            step_time,
            samples,
        }
    }

    /// Creates a series from parallel value and absence vectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSeries`] if the two vectors differ in length.
    pub fn from_parts(
        name: impl Into<String>,
        start_time: i64,
        stop_time: i64,
        step_time: i64,
        values: Vec<f64>,
        is_absent: Vec<bool>,
    ) -> Result<Self> {
        let name = name.into();
        if values.len() != is_absent.len() {
            return Err(Error::MalformedSeries(format!(
                "{}: {} values but {} absence flags",
                name,
                values.len(),
                is_absent.len()
            )));
        }
        let samples = values
            .into_iter()
            .zip(is_absent)
            .map(|(v, absent)| if absent { None } else { Some(v) })
            .collect();
        Ok(Self::with_window(name, start_time, stop_time, step_time, samples))
    }

    /// Creates a series from plain values, treating NaN as absent.
    ///
    /// This mirrors how fetched Graphite data is usually written down and is
    /// the convenient constructor for fixtures.
    pub fn from_values(
        name: impl Into<String>,
        start_time: i64,
        step_time: i64,
        values: &[f64],
    ) -> Self {
        let samples = values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        Self::new(name, start_time, step_time, samples)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn stop_time(&self) -> i64 {
        self.stop_time
    }

    pub fn step_time(&self) -> i64 {
        self.step_time
    }

    /// The tagged samples, `None` marking an absent step.
    pub fn samples(&self) -> &[Option<f64>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample values with absent steps rendered as NaN.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.unwrap_or(f64::NAN))
    }

    /// Absence flags, parallel to [`Series::values`].
    pub fn is_absent(&self) -> impl Iterator<Item = bool> + '_ {
        self.samples.iter().map(Option::is_none)
    }

    /// Iterates over the present values only.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().flatten().copied()
    }

    /// Returns a new series on the same window with every sample mapped.
    pub fn map_samples<F>(&self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(Option<f64>) -> Option<f64>,
    {
        Self {
            name: name.into(),
            start_time: self.start_time,
            stop_time: self.stop_time,
            step_time: self.step_time,
            samples: self.samples.iter().copied().map(f).collect(),
        }
    }

    /// Returns a new series on the same window with the given samples.
    pub(crate) fn with_samples(&self, name: impl Into<String>, samples: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            start_time: self.start_time,
            stop_time: self.stop_time,
            step_time: self.step_time,
            samples,
        }
    }
}

// Bitwise on sample values so that identical NaNs compare equal; deep
// comparison of fetched data must be byte-for-byte, not IEEE equality.
impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.start_time == other.start_time
            && self.stop_time == other.stop_time
            && self.step_time == other.step_time
            && self.samples.len() == other.samples.len()
            && self
                .samples
                .iter()
                .zip(&other.samples)
                .all(|(a, b)| a.map(f64::to_bits) == b.map(f64::to_bits))
    }
}

/// Key into a [`FetchedData`] set: a metric pattern and the window it was
/// fetched for.
///
/// `from` is inclusive and `until` is exclusive, both in Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchKey {
    pub pattern: String,
    pub from: i64,
    pub until: i64,
}

impl FetchKey {
    pub fn new(pattern: impl Into<String>, from: i64, until: i64) -> Self {
        Self {
            pattern: pattern.into(),
            from,
            until,
        }
    }
}

/// Series already fetched from storage, keyed by pattern and window.
///
/// A pattern may map to several concrete series, for example when a glob
/// was expanded upstream. Entries are shared handles: evaluation clones the
/// `Arc`, never the series, and nothing reachable from the set can be
/// mutated once it has been built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedData {
    entries: HashMap<FetchKey, Vec<Arc<Series>>>,
}

impl FetchedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the series fetched for `pattern` over `[from, until)`, replacing
    /// any previous entry for the same key.
    pub fn insert(
        &mut self,
        pattern: impl Into<String>,
        from: i64,
        until: i64,
        series: Vec<Series>,
    ) -> &mut Self {
        self.entries.insert(
            FetchKey::new(pattern, from, until),
            series.into_iter().map(Arc::new).collect(),
        );
        self
    }

    /// Adds already shared series under `key`.
    pub fn insert_shared(&mut self, key: FetchKey, series: Vec<Arc<Series>>) -> &mut Self {
        self.entries.insert(key, series);
        self
    }

    pub fn get(&self, key: &FetchKey) -> Option<&[Arc<Series>]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FetchKey, &[Arc<Series>])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
