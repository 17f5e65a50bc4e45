//! Quantile and equal-width binning shared by the chart builders.

use serde::Serialize;

/// Number of equal-count bins used by decile charts
pub const DECILES: usize = 10;

/// Bin count of the equal-width histograms
pub const HISTOGRAM_BINS: usize = 12;

/// Finite values of `values`, sorted ascending.
pub fn sorted_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quantile of an ascending sample with linear interpolation between order
/// statistics: position `(n - 1) * q`, blended between its floor and ceil.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !q.is_finite() {
        return None;
    }

    let position = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = (position.ceil() as usize).min(sorted.len() - 1);
    let weight = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn median(sorted: &[f64]) -> Option<f64> {
    quantile(sorted, 0.5)
}

/// `bins + 1` edges at quantiles `0, 1/bins, ..., 1` of an ascending sample.
///
/// Repeated edges collapse, so heavily tied samples produce fewer bins and an
/// all-equal sample produces the single degenerate bin `[v, v]`.
pub fn quantile_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    if sorted.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut edges: Vec<f64> = (0..=bins)
        .filter_map(|i| quantile(sorted, i as f64 / bins as f64))
        .collect();
    edges.dedup();

    if edges.len() == 1 {
        edges.push(edges[0]);
    }
    edges
}

/// Decile edges (11 for a sample with enough distinct values).
pub fn decile_edges(sorted: &[f64]) -> Vec<f64> {
    quantile_edges(sorted, DECILES)
}

/// `bins + 1` evenly spaced edges covering `[min, max]`; a zero-width range is one bin.
pub fn equal_width_edges(min: f64, max: f64, bins: usize) -> Vec<f64> {
    if bins == 0 || !min.is_finite() || !max.is_finite() {
        return Vec::new();
    }
    if max <= min {
        return vec![min, min];
    }

    let width = (max - min) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| min + width * i as f64).collect();
    edges.push(max);
    edges
}

/// Bin `i` such that `edges[i] <= value < edges[i + 1]`; the last bin is closed
/// and values outside the edges are clamped to the first or last bin.
pub fn bin_index_of(value: f64, edges: &[f64]) -> Option<usize> {
    if edges.len() < 2 || !value.is_finite() {
        return None;
    }
    let interior = &edges[1..edges.len() - 1];
    Some(interior.partition_point(|edge| *edge <= value))
}

/// Number of bins described by `edges`
pub fn bin_count(edges: &[f64]) -> usize {
    edges.len().saturating_sub(1)
}

/// Counts per equal-width bin with `"{lo}–{hi}"` labels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    pub labels: Vec<String>,
}

impl Histogram {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Equal-width histogram of the finite values; non-finite values are skipped.
pub fn histogram(values: impl IntoIterator<Item = f64>, bins: usize) -> Histogram {
    let sorted = sorted_finite(values);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Histogram::default();
    };

    let edges = equal_width_edges(min, max, bins);
    let mut counts = vec![0; bin_count(&edges)];
    for value in &sorted {
        if let Some(index) = bin_index_of(*value, &edges) {
            counts[index] += 1;
        }
    }

    let labels = edges
        .windows(2)
        .map(|pair| format!("{}–{}", format_edge(pair[0]), format_edge(pair[1])))
        .collect();

    Histogram {
        edges,
        counts,
        labels,
    }
}

/// Compact edge label: fewer decimals for larger magnitudes.
pub fn format_edge(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1000.0 {
        format!("{value:.0}")
    } else if magnitude >= 1.0 || magnitude == 0.0 {
        format!("{value:.2}")
    } else {
        format!("{value:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        struct TestCase {
            sample: Vec<f64>,
            q: f64,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: empty sample
                sample: vec![],
                q: 0.5,
                expected: None,
            },
            TestCase {
                // TC1: single value
                sample: vec![7.0],
                q: 0.9,
                expected: Some(7.0),
            },
            TestCase {
                // TC2: even-length median interpolates
                sample: vec![1.0, 2.0, 3.0, 4.0],
                q: 0.5,
                expected: Some(2.5),
            },
            TestCase {
                // TC3: position (4 - 1) * 0.25 = 0.75
                sample: vec![0.0, 10.0, 20.0, 30.0],
                q: 0.25,
                expected: Some(7.5),
            },
            TestCase {
                // TC4: out of range q is clamped
                sample: vec![1.0, 2.0],
                q: 1.5,
                expected: Some(2.0),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = quantile(&test.sample, test.q);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_decile_bins_are_equal_count() {
        for n in [100usize, 95, 37] {
            let sample: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let edges = decile_edges(&sample);
            assert_eq!(edges.len(), DECILES + 1);

            let mut counts = vec![0usize; DECILES];
            for value in &sample {
                let index = bin_index_of(*value, &edges).unwrap();
                assert!(index < DECILES);
                counts[index] += 1;
            }

            assert_eq!(counts.iter().sum::<usize>(), n);
            let expected = n as f64 / DECILES as f64;
            for count in counts {
                assert!(
                    (count as f64 - expected).abs() <= 1.0,
                    "n={n}: bin count {count} too far from {expected}"
                );
            }
        }
    }

    #[test]
    fn test_all_equal_sample_is_one_bin() {
        let sample = vec![3.0; 20];
        let edges = decile_edges(&sample);
        assert_eq!(edges, vec![3.0, 3.0]);
        assert_eq!(bin_count(&edges), 1);
        assert_eq!(bin_index_of(3.0, &edges), Some(0));
    }

    #[test]
    fn test_bin_index_of_clamps() {
        let edges = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(bin_index_of(-5.0, &edges), Some(0));
        assert_eq!(bin_index_of(1.0, &edges), Some(1));
        assert_eq!(bin_index_of(3.0, &edges), Some(2));
        assert_eq!(bin_index_of(99.0, &edges), Some(2));
        assert_eq!(bin_index_of(f64::NAN, &edges), None);
        assert_eq!(bin_index_of(1.0, &[1.0]), None);
    }

    #[test]
    fn test_histogram_counts_finite_values() {
        let mut values: Vec<f64> = (0..=24).map(|i| i as f64).collect();
        values.extend([f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);

        let histogram = histogram(values, HISTOGRAM_BINS);

        assert_eq!(histogram.counts.len(), HISTOGRAM_BINS);
        assert_eq!(histogram.labels.len(), HISTOGRAM_BINS);
        assert_eq!(histogram.total(), 25);
        assert_eq!(histogram.labels[0], "0.00–2.00");
        assert_eq!(histogram.edges.last(), Some(&24.0));
        // 24 lands in the closed last bin
        assert_eq!(histogram.counts[HISTOGRAM_BINS - 1], 3);
    }

    #[test]
    fn test_histogram_degenerate_and_empty() {
        let single = histogram(vec![5.0, 5.0, 5.0], HISTOGRAM_BINS);
        assert_eq!(single.counts, vec![3]);
        assert_eq!(single.labels, vec!["5.00–5.00".to_string()]);

        let empty = histogram(Vec::<f64>::new(), HISTOGRAM_BINS);
        assert!(empty.is_empty());
        assert_eq!(empty.total(), 0);
    }
}
