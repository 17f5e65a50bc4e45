//! Largest-Triangle-Three-Buckets decimation of scatter series.

/// Scatter series are capped to this many points before rendering
pub const DEFAULT_SCATTER_CAP: usize = 600;

/// Reduce `points` (ordered by x) to at most `threshold` points.
///
/// The first and last points are always kept. The inner points are split into
/// `threshold - 2` buckets of equal point count (not equal x-range), and each
/// bucket contributes the point forming the largest triangle with the previously
/// selected point and the next bucket's average.
/// `threshold == 0` or `threshold >= points.len()` returns the input unchanged.
pub fn decimate(points: &[(f64, f64)], threshold: usize) -> Vec<(f64, f64)> {
    let len = points.len();
    if threshold == 0 || threshold >= len {
        return points.to_vec();
    }
    match threshold {
        1 => return vec![points[0]],
        2 => return vec![points[0], points[len - 1]],
        _ => {}
    }

    let buckets = threshold - 2;
    let bucket_size = (len - 2) as f64 / buckets as f64;
    // The last inner bucket always ends right before the final point
    let bucket_start = |bucket: usize| {
        if bucket >= buckets {
            len - 1
        } else {
            ((bucket as f64 * bucket_size) as usize + 1).min(len - 1)
        }
    };

    let mut sampled = Vec::with_capacity(threshold);
    sampled.push(points[0]);
    let mut anchor = 0;

    for bucket in 0..buckets {
        let (range_start, range_end) = (bucket_start(bucket), bucket_start(bucket + 1));

        // Average of the following bucket; the final bucket looks at the last point
        let next_start = range_end;
        let next_end = bucket_start(bucket + 2).max(next_start + 1).min(len);
        let next = &points[next_start..next_end];
        let (avg_x, avg_y) = if bucket + 1 == buckets || next.is_empty() {
            points[len - 1]
        } else {
            let (sum_x, sum_y) = next
                .iter()
                .fold((0.0_f64, 0.0_f64), |(sx, sy), (x, y)| (sx + x, sy + y));
            (sum_x / next.len() as f64, sum_y / next.len() as f64)
        };

        let (anchor_x, anchor_y) = points[anchor];
        let mut selected = range_start;
        let mut max_area = f64::NEG_INFINITY;

        for (index, (x, y)) in points
            .iter()
            .enumerate()
            .take(range_end.max(range_start + 1))
            .skip(range_start)
        {
            let area =
                ((anchor_x - avg_x) * (y - anchor_y) - (anchor_x - x) * (avg_y - anchor_y)).abs();
            if area > max_area {
                max_area = area;
                selected = index;
            }
        }

        sampled.push(points[selected]);
        anchor = selected;
    }

    sampled.push(points[len - 1]);
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                (x, (x / 7.0).sin() * 10.0 + if i % 50 == 0 { 1000.0 } else { 0.0 })
            })
            .collect()
    }

    #[test]
    fn test_decimate_keeps_endpoints_and_cap() {
        let points = wave(5000);

        for threshold in [2usize, 3, 10, 600, 4999] {
            let sampled = decimate(&points, threshold);
            assert_eq!(sampled.len(), threshold, "threshold {threshold}");
            assert_eq!(sampled.first(), points.first());
            assert_eq!(sampled.last(), points.last());
            // Output stays ordered by x
            assert!(sampled.windows(2).all(|pair| pair[0].0 < pair[1].0));
        }
    }

    #[test]
    fn test_decimate_last_bucket_reaches_penultimate_point() {
        // Only the penultimate point stands out, so it must be selectable
        for len in [7usize, 101, 1003, 4999] {
            let mut points: Vec<(f64, f64)> = (0..len).map(|i| (i as f64, 0.0)).collect();
            points[len - 2].1 = 1.0e6;

            for threshold in [3usize, 7, 64] {
                let sampled = decimate(&points, threshold);
                assert!(
                    sampled.contains(&points[len - 2]),
                    "len {len} threshold {threshold} dropped the penultimate point"
                );
            }
        }
    }

    #[test]
    fn test_decimate_noop_cases() {
        let points = wave(100);
        assert_eq!(decimate(&points, 0), points);
        assert_eq!(decimate(&points, 100), points);
        assert_eq!(decimate(&points, 1000), points);
        assert!(decimate(&[], 600).is_empty());
        assert_eq!(decimate(&points, 1), vec![points[0]]);
    }

    #[test]
    fn test_decimate_is_deterministic_and_keeps_spikes() {
        let points = wave(3000);
        let first = decimate(&points, DEFAULT_SCATTER_CAP);
        let second = decimate(&points, DEFAULT_SCATTER_CAP);
        assert_eq!(first, second);

        // Every periodic spike dominates its bucket
        let spikes = first.iter().filter(|(_, y)| *y > 500.0).count();
        assert_eq!(spikes, 3000 / 50);
    }
}
