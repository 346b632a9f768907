//! Rendering scales produced by the classifier.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::Serialize;

use crate::palette::Rgba;

/// Area-true proportional circle scale.
///
/// `radius(v) = sqrt(v) / PI * ratio`, with `ratio` chosen so that the data
/// maximum maps exactly to `max_radius`. Circle area is therefore linear in
/// the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeScale {
    pub domain: [f64; 2],
    pub max_radius: f64,
    pub ratio: f64,
}

impl SizeScale {
    /// `None` when `max` is not a positive finite number.
    pub fn new(min: f64, max: f64, max_radius: f64) -> Option<Self> {
        if !(max.is_finite() && max > 0.0) {
            return None;
        }
        Some(Self {
            domain: [min, max],
            max_radius,
            ratio: max_radius / (max.sqrt() / PI),
        })
    }

    /// Radius for `value`; negative and non-numeric values get radius 0.
    pub fn radius(&self, value: f64) -> f64 {
        if value.is_nan() || value <= 0.0 {
            return 0.0;
        }
        (value.sqrt() / PI * self.ratio).max(0.0)
    }

    /// Radii of the domain endpoints.
    pub fn range(&self) -> [f64; 2] {
        [self.radius(self.domain[0]), self.radius(self.domain[1])]
    }
}

/// Discrete value to colour scale with quantile thresholds.
///
/// The thresholds are the `n - 1` quantiles of the domain for `n` colours.
/// When the domain is a break list of `n + 1` class bounds they are exactly
/// the interior breaks, so a value equal to a break belongs to the class the
/// break opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileScale {
    domain: Vec<f64>,
    range: Vec<Rgba>,
    thresholds: Vec<f64>,
}

impl QuantileScale {
    pub fn new(domain: &[f64], range: Vec<Rgba>) -> Self {
        let mut sorted: Vec<f64> = domain.iter().copied().filter(|v| !v.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);
        let n = range.len();
        let thresholds = if sorted.is_empty() || n == 0 {
            Vec::new()
        } else {
            (1..n).map(|i| quantile(&sorted, i, n)).collect()
        };
        Self {
            domain: sorted,
            range,
            thresholds,
        }
    }

    pub fn domain(&self) -> &[f64] {
        &self.domain
    }

    pub fn range(&self) -> &[Rgba] {
        &self.range
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Class index of `value`, `None` for NaN or an empty range.
    pub fn classify(&self, value: f64) -> Option<usize> {
        if value.is_nan() || self.range.is_empty() {
            return None;
        }
        Some(self.thresholds.partition_point(|t| *t <= value))
    }

    pub fn color(&self, value: f64) -> Option<Rgba> {
        self.classify(value).map(|i| self.range[i])
    }

    /// Value interval covered by the class drawn in `color`.
    ///
    /// The outer classes are bounded by the domain extent.
    pub fn invert_extent(&self, color: Rgba) -> Option<(f64, f64)> {
        let i = self.range.iter().position(|c| *c == color)?;
        let lo = if i == 0 {
            *self.domain.first()?
        } else {
            self.thresholds.get(i - 1).copied()?
        };
        let hi = if i == self.thresholds.len() {
            *self.domain.last()?
        } else {
            self.thresholds.get(i).copied()?
        };
        Some((lo, hi))
    }
}

/// R-7 quantile at probability `i / n` of sorted `values`.
fn quantile(values: &[f64], i: usize, n: usize) -> f64 {
    let last = values.len() - 1;
    let h = (last * i) as f64 / n as f64;
    let lo = h.floor() as usize;
    let base = values[lo];
    if lo >= last {
        return base;
    }
    base + (values[lo + 1] - base) * (h - lo as f64)
}

/// Category to colour scale; categories are bound in first-seen order and
/// colours are reused cyclically once the range is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrdinalScale {
    domain: Vec<String>,
    range: Vec<Rgba>,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

impl OrdinalScale {
    pub fn new<I, S>(categories: I, range: Vec<Rgba>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut domain = Vec::new();
        let mut index = BTreeMap::new();
        for c in categories {
            let c = c.into();
            if !index.contains_key(&c) {
                index.insert(c.clone(), domain.len());
                domain.push(c);
            }
        }
        Self {
            domain,
            range,
            index,
        }
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn range(&self) -> &[Rgba] {
        &self.range
    }

    /// `None` for a category that was not in the data or an empty range.
    pub fn color(&self, category: &str) -> Option<Rgba> {
        if self.range.is_empty() {
            return None;
        }
        self.index
            .get(category)
            .map(|i| self.range[i % self.range.len()])
    }
}

/// The one scale a [`crate::stats::Stats`] carries, chosen by map mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scale {
    Size(SizeScale),
    Value(QuantileScale),
    Colour(OrdinalScale),
}
