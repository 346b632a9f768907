//! Jenks natural breaks.
//!
//! Optimal one-dimensional clustering by dynamic programming over the sorted
//! *distinct* values, each weighted by its multiplicity. Working on distinct
//! values means a class boundary can never fall between two equal values, so
//! the interior breaks are strictly increasing.

/// Result of a natural-breaks run.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalBreaks {
    /// Class lower bounds followed by the maximum: `k + 1` entries.
    pub breaks: Vec<f64>,
    /// Number of classes actually produced (less than requested when the data
    /// has fewer distinct values).
    pub classes: usize,
}

/// Cluster `values` into at most `k` classes.
///
/// Non-finite values are ignored. Returns `None` when no finite value
/// remains or `k == 0`.
pub fn natural_breaks(values: &[f64], k: usize) -> Option<NaturalBreaks> {
    let (distinct, weights) = distinct_weighted(values);
    if distinct.is_empty() || k == 0 {
        return None;
    }
    let k = k.min(distinct.len());
    let starts = class_starts(&distinct, &weights, k);

    let mut breaks: Vec<f64> = starts.iter().map(|&i| distinct[i]).collect();
    breaks.push(distinct[distinct.len() - 1]);
    Some(NaturalBreaks { breaks, classes: k })
}

fn distinct_weighted(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let mut distinct: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut weights: Vec<f64> = Vec::with_capacity(sorted.len());
    for v in sorted {
        match distinct.last() {
            Some(&last) if last == v => {
                if let Some(w) = weights.last_mut() {
                    *w += 1.0;
                }
            }
            _ => {
                distinct.push(v);
                weights.push(1.0);
            }
        }
    }
    (distinct, weights)
}

/// Prefix sums of weight, weighted value and weighted square.
struct Prefix {
    w: Vec<f64>,
    wx: Vec<f64>,
    wxx: Vec<f64>,
}

impl Prefix {
    fn new(values: &[f64], weights: &[f64]) -> Self {
        let n = values.len();
        let mut p = Prefix {
            w: vec![0.0; n + 1],
            wx: vec![0.0; n + 1],
            wxx: vec![0.0; n + 1],
        };
        for i in 0..n {
            let (x, w) = (values[i], weights[i]);
            p.w[i + 1] = p.w[i] + w;
            p.wx[i + 1] = p.wx[i] + w * x;
            p.wxx[i + 1] = p.wxx[i] + w * x * x;
        }
        p
    }

    /// Weighted sum of squared deviations of `values[i..=j]`.
    fn ssd(&self, i: usize, j: usize) -> f64 {
        let w = self.w[j + 1] - self.w[i];
        let s = self.wx[j + 1] - self.wx[i];
        let ss = self.wxx[j + 1] - self.wxx[i];
        (ss - s * s / w).max(0.0)
    }
}

/// Start index of every class, first one always 0.
///
/// Ties between equally good splits go to the earliest split point.
fn class_starts(values: &[f64], weights: &[f64], k: usize) -> Vec<usize> {
    let n = values.len();
    let prefix = Prefix::new(values, weights);

    // cost[c][j]: best cost of splitting values[0..=j] into c + 1 classes
    // start[c][j]: first index of the last class in that split
    let mut cost = vec![vec![f64::INFINITY; n]; k];
    let mut start = vec![vec![0usize; n]; k];
    for j in 0..n {
        cost[0][j] = prefix.ssd(0, j);
    }
    for c in 1..k {
        for j in c..n {
            for i in c..=j {
                let candidate = cost[c - 1][i - 1] + prefix.ssd(i, j);
                if candidate < cost[c][j] {
                    cost[c][j] = candidate;
                    start[c][j] = i;
                }
            }
        }
    }

    let mut starts = vec![0usize; k];
    let mut end = n - 1;
    for c in (1..k).rev() {
        let s = start[c][end];
        starts[c] = s;
        end = s - 1;
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_obvious_clusters() {
        let nb = natural_breaks(&[1.0, 2.0, 3.0, 100.0, 101.0, 102.0], 2).unwrap();
        assert_eq!(nb.breaks, vec![1.0, 100.0, 102.0]);
        assert_eq!(nb.classes, 2);
    }

    #[test]
    fn three_clusters_in_unsorted_input() {
        let values = [50.0, 1.0, 52.0, 2.0, 51.0, 900.0, 3.0, 910.0];
        let nb = natural_breaks(&values, 3).unwrap();
        assert_eq!(nb.breaks, vec![1.0, 50.0, 900.0, 910.0]);
    }

    #[test]
    fn duplicates_never_straddle_a_break() {
        let values = [1.0, 1.0, 1.0, 1.0, 2.0, 10.0, 10.0, 11.0];
        let nb = natural_breaks(&values, 3).unwrap();
        for w in nb.breaks[..nb.classes].windows(2) {
            assert!(w[0] < w[1], "{:?}", nb.breaks);
        }
        assert_eq!(nb.breaks.first(), Some(&1.0));
        assert_eq!(nb.breaks.last(), Some(&11.0));
    }

    #[test]
    fn fewer_distinct_values_than_classes_collapses() {
        let nb = natural_breaks(&[4.0, 4.0, 7.0, 7.0, 7.0], 5).unwrap();
        assert_eq!(nb.classes, 2);
        assert_eq!(nb.breaks, vec![4.0, 7.0, 7.0]);

        let single = natural_breaks(&[3.0, 3.0], 4).unwrap();
        assert_eq!(single.classes, 1);
        assert_eq!(single.breaks, vec![3.0, 3.0]);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let nb = natural_breaks(&[f64::NAN, 1.0, f64::INFINITY, 9.0], 2).unwrap();
        assert_eq!(nb.breaks, vec![1.0, 9.0, 9.0]);
        assert!(natural_breaks(&[f64::NAN], 3).is_none());
        assert!(natural_breaks(&[1.0], 0).is_none());
    }
}
