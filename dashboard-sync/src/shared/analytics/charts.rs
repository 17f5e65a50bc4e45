//! Chart builders turning the analytics collection into plottable series.
//!
//! Every builder is pure: empty input gives an empty series, sparse buckets give
//! `None` (a gap) rather than zero, and a row whose metric is missing or
//! non-finite is skipped for that chart only.

use crate::shared::analytics::binning::{
    self, Histogram, bin_count, bin_index_of, decile_edges, equal_width_edges, median,
    quantile, sorted_finite,
};
use crate::shared::analytics::lttb;
use crate::shared::derived::position_change_pct;
use crate::shared::types::{AnalyticsRecord, Position};
use serde::Serialize;
use std::str::FromStr;

/// Buckets with fewer samples carry no statistic
pub const MIN_BUCKET_SAMPLES: usize = 3;

/// Heatmap cells within this fraction of the best aggregate are flagged notable
pub const NOTABLE_TOLERANCE: f64 = 0.10;

/// Bucket count of the calibration curve
pub const CALIBRATION_BUCKETS: usize = 10;

/// Chartable scalar fields of an [`AnalyticsRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rank,
    QualityScore,
    StatisticsScore,
    EntryScore,
    FinalScore,
    AiProbability,
    AiQualityDelta,
    TokenAgeHours,
    Volume5m,
    Volume1h,
    Volume6h,
    Volume24h,
    LiquidityUsd,
    Pct5m,
    Pct1h,
    Pct6h,
    Pct24h,
    Tx5m,
    Tx1h,
    Tx6h,
    Tx24h,
    SizingMultiplier,
    OrderNotionalUsd,
    PnlPct,
    PnlUsd,
    HoldingMinutes,
}

impl Metric {
    pub const ALL: [Metric; 26] = [
        Metric::Rank,
        Metric::QualityScore,
        Metric::StatisticsScore,
        Metric::EntryScore,
        Metric::FinalScore,
        Metric::AiProbability,
        Metric::AiQualityDelta,
        Metric::TokenAgeHours,
        Metric::Volume5m,
        Metric::Volume1h,
        Metric::Volume6h,
        Metric::Volume24h,
        Metric::LiquidityUsd,
        Metric::Pct5m,
        Metric::Pct1h,
        Metric::Pct6h,
        Metric::Pct24h,
        Metric::Tx5m,
        Metric::Tx1h,
        Metric::Tx6h,
        Metric::Tx24h,
        Metric::SizingMultiplier,
        Metric::OrderNotionalUsd,
        Metric::PnlPct,
        Metric::PnlUsd,
        Metric::HoldingMinutes,
    ];

    /// Finite value of this metric on `record`, if any.
    pub fn value(&self, record: &AnalyticsRecord) -> Option<f64> {
        let scores = &record.scores;
        let fundamentals = &record.fundamentals;

        let raw = match self {
            Metric::Rank => record.rank,
            Metric::QualityScore => scores.quality,
            Metric::StatisticsScore => scores.statistics,
            Metric::EntryScore => scores.entry,
            Metric::FinalScore => scores.final_score,
            Metric::AiProbability => record.ai.probability_tp1_before_sl,
            Metric::AiQualityDelta => record.ai.quality_score_delta,
            Metric::TokenAgeHours => fundamentals.token_age_hours,
            Metric::Volume5m => fundamentals.volume_5m_usd,
            Metric::Volume1h => fundamentals.volume_1h_usd,
            Metric::Volume6h => fundamentals.volume_6h_usd,
            Metric::Volume24h => fundamentals.volume_24h_usd,
            Metric::LiquidityUsd => fundamentals.liquidity_usd,
            Metric::Pct5m => fundamentals.pct_5m,
            Metric::Pct1h => fundamentals.pct_1h,
            Metric::Pct6h => fundamentals.pct_6h,
            Metric::Pct24h => fundamentals.pct_24h,
            Metric::Tx5m => fundamentals.tx_5m,
            Metric::Tx1h => fundamentals.tx_1h,
            Metric::Tx6h => fundamentals.tx_6h,
            Metric::Tx24h => fundamentals.tx_24h,
            Metric::SizingMultiplier => record.decision.sizing_multiplier,
            Metric::OrderNotionalUsd => record.decision.order_notional_usd,
            Metric::PnlPct => record.outcome.pnl_pct,
            Metric::PnlUsd => record.outcome.pnl_usd,
            Metric::HoldingMinutes => record.outcome.holding_minutes,
        };

        raw.filter(|value| value.is_finite())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Rank => "rank",
            Metric::QualityScore => "quality_score",
            Metric::StatisticsScore => "statistics_score",
            Metric::EntryScore => "entry_score",
            Metric::FinalScore => "final_score",
            Metric::AiProbability => "ai_probability",
            Metric::AiQualityDelta => "ai_quality_delta",
            Metric::TokenAgeHours => "token_age_hours",
            Metric::Volume5m => "volume_5m",
            Metric::Volume1h => "volume_1h",
            Metric::Volume6h => "volume_6h",
            Metric::Volume24h => "volume_24h",
            Metric::LiquidityUsd => "liquidity_usd",
            Metric::Pct5m => "pct_5m",
            Metric::Pct1h => "pct_1h",
            Metric::Pct6h => "pct_6h",
            Metric::Pct24h => "pct_24h",
            Metric::Tx5m => "tx_5m",
            Metric::Tx1h => "tx_1h",
            Metric::Tx6h => "tx_6h",
            Metric::Tx24h => "tx_24h",
            Metric::SizingMultiplier => "sizing_multiplier",
            Metric::OrderNotionalUsd => "order_notional_usd",
            Metric::PnlPct => "pnl_pct",
            Metric::PnlUsd => "pnl_usd",
            Metric::HoldingMinutes => "holding_minutes",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == wanted)
            .ok_or_else(|| format!("unknown metric `{raw}`"))
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which candidate rows a chart looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RowFilter {
    /// Every evaluated candidate
    #[default]
    All,
    /// Closed trades only (`outcome.hasOutcome`)
    WithOutcome,
}

impl RowFilter {
    pub fn accepts(&self, record: &AnalyticsRecord) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::WithOutcome => record.outcome.has_outcome,
        }
    }
}

/// `(x, y)` pairs of rows passing `filter` with both metrics defined
pub fn metric_pairs<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    x: Metric,
    y: Metric,
    filter: RowFilter,
) -> Vec<(f64, f64)> {
    records
        .into_iter()
        .filter(|record| filter.accepts(record))
        .filter_map(|record| Some((x.value(record)?, y.value(record)?)))
        .collect()
}

/// Equal-width histogram of one metric
pub fn metric_histogram<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    metric: Metric,
    filter: RowFilter,
    bins: usize,
) -> Histogram {
    binning::histogram(
        records
            .into_iter()
            .filter(|record| filter.accepts(record))
            .filter_map(|record| metric.value(record)),
        bins,
    )
}

/// Equal-width histogram of position change % (enriched or computed)
pub fn position_change_histogram(positions: &[Position], bins: usize) -> Histogram {
    binning::histogram(positions.iter().filter_map(position_change_pct), bins)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub positives: usize,
    pub mean_predicted: Option<f64>,
    pub positive_rate: Option<f64>,
}

/// Observed rate of `target_action` decisions per probability bucket over `[0, 1]`.
///
/// Out of range probabilities are clamped into the end buckets.
pub fn calibration_curve<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    probability: Metric,
    target_action: &str,
    bins: usize,
    filter: RowFilter,
) -> Vec<CalibrationBucket> {
    let edges = equal_width_edges(0.0, 1.0, bins);
    let mut sums = vec![(0usize, 0usize, 0.0f64); bin_count(&edges)];

    let mut any = false;
    for record in records.into_iter().filter(|record| filter.accepts(record)) {
        let Some(value) = probability.value(record) else {
            continue;
        };
        let value = value.clamp(0.0, 1.0);
        let Some(index) = bin_index_of(value, &edges) else {
            continue;
        };

        let (count, positives, total) = &mut sums[index];
        *count += 1;
        *total += value;
        if record.decision.is_action(target_action) {
            *positives += 1;
        }
        any = true;
    }

    if !any {
        return Vec::new();
    }

    edges
        .windows(2)
        .zip(sums)
        .map(|(pair, (count, positives, total))| CalibrationBucket {
            lower: pair[0],
            upper: pair[1],
            count,
            positives,
            mean_predicted: (count > 0).then(|| total / count as f64),
            positive_rate: (count > 0).then(|| positives as f64 / count as f64),
        })
        .collect()
}

/// Outcome statistics of one score decile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub median: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub win_rate: Option<f64>,
}

/// Median / quartiles / win-rate (outcome > 0) of `outcome` per decile of `score`.
pub fn score_bucket_stats<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    score: Metric,
    outcome: Metric,
    filter: RowFilter,
) -> Vec<ScoreBucket> {
    let pairs = metric_pairs(records, score, outcome, filter);
    let edges = decile_edges(&sorted_finite(pairs.iter().map(|(x, _)| *x)));
    let groups = group_by_bin(&pairs, &edges);

    edges
        .windows(2)
        .zip(groups)
        .map(|(pair, mut outcomes)| {
            outcomes.sort_by(f64::total_cmp);
            let reliable = outcomes.len() >= MIN_BUCKET_SAMPLES;
            let stat = |q: f64| if reliable { quantile(&outcomes, q) } else { None };

            ScoreBucket {
                lower: pair[0],
                upper: pair[1],
                count: outcomes.len(),
                median: stat(0.5),
                q1: stat(0.25),
                q3: stat(0.75),
                win_rate: reliable.then(|| {
                    outcomes.iter().filter(|value| **value > 0.0).count() as f64
                        / outcomes.len() as f64
                }),
            }
        })
        .collect()
}

/// Axis binning of a heatmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Binning {
    EqualWidth(usize),
    Deciles,
}

impl Binning {
    pub fn edges(&self, sorted: &[f64]) -> Vec<f64> {
        match self {
            Binning::EqualWidth(bins) => match (sorted.first(), sorted.last()) {
                (Some(min), Some(max)) => equal_width_edges(*min, *max, *bins),
                _ => Vec::new(),
            },
            Binning::Deciles => decile_edges(sorted),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Aggregate {
    #[default]
    Mean,
    Median,
}

impl Aggregate {
    fn apply(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregate::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Median => {
                values.sort_by(f64::total_cmp);
                median(values)
            }
        }
    }
}

/// What a heatmap plots
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatmapSpec {
    pub x: Metric,
    pub y: Metric,
    pub z: Metric,
    pub x_binning: Binning,
    pub y_binning: Binning,
    pub aggregate: Aggregate,
    pub filter: RowFilter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeatCell {
    pub count: usize,
    pub value: Option<f64>,
    pub notable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Heatmap {
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    /// Indexed `[y][x]`
    pub cells: Vec<Vec<HeatCell>>,
    /// `(y, x)` of the best cell with enough samples
    pub best: Option<(usize, usize)>,
}

impl Heatmap {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

pub fn heatmap<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    spec: &HeatmapSpec,
) -> Heatmap {
    let rows: Vec<(f64, f64, f64)> = records
        .into_iter()
        .filter(|record| spec.filter.accepts(record))
        .filter_map(|record| {
            Some((
                spec.x.value(record)?,
                spec.y.value(record)?,
                spec.z.value(record)?,
            ))
        })
        .collect();

    if rows.is_empty() {
        return Heatmap::default();
    }

    let x_edges = spec
        .x_binning
        .edges(&sorted_finite(rows.iter().map(|(x, _, _)| *x)));
    let y_edges = spec
        .y_binning
        .edges(&sorted_finite(rows.iter().map(|(_, y, _)| *y)));

    let (columns, lines) = (bin_count(&x_edges), bin_count(&y_edges));
    let mut values = vec![vec![Vec::new(); columns]; lines];
    for (x, y, z) in &rows {
        if let (Some(column), Some(line)) = (bin_index_of(*x, &x_edges), bin_index_of(*y, &y_edges)) {
            values[line][column].push(*z);
        }
    }

    let mut cells: Vec<Vec<HeatCell>> = values
        .into_iter()
        .map(|line| {
            line.into_iter()
                .map(|mut samples| HeatCell {
                    count: samples.len(),
                    value: spec.aggregate.apply(&mut samples),
                    notable: false,
                })
                .collect()
        })
        .collect();

    let best = cells
        .iter()
        .enumerate()
        .flat_map(|(line, row)| row.iter().enumerate().map(move |(column, cell)| (line, column, cell)))
        .filter(|(_, _, cell)| cell.count >= MIN_BUCKET_SAMPLES)
        .filter_map(|(line, column, cell)| Some((line, column, cell.value?)))
        .fold(None, |best: Option<(usize, usize, f64)>, candidate| match best {
            Some(best) if best.2 >= candidate.2 => Some(best),
            _ => Some(candidate),
        });

    if let Some((_, _, best_value)) = best {
        let threshold = best_value - NOTABLE_TOLERANCE * best_value.abs();
        for cell in cells.iter_mut().flatten() {
            cell.notable = cell.count >= MIN_BUCKET_SAMPLES
                && cell.value.is_some_and(|value| value >= threshold);
        }
    }

    Heatmap {
        x_edges,
        y_edges,
        cells,
        best: best.map(|(line, column, _)| (line, column)),
    }
}

/// Least-squares fit `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub x_min: f64,
    pub x_max: f64,
}

impl TrendLine {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn least_squares(points: &[(f64, f64)]) -> Option<TrendLine> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let (x_min, x_max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));

    Some(TrendLine {
        slope,
        intercept: mean_y - slope * mean_x,
        x_min,
        x_max,
    })
}

/// Median overlay point; `y` is `None` for sparse bins
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayPoint {
    pub x: f64,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScatterSeries {
    /// Decimated points, ordered by x
    pub points: Vec<(f64, f64)>,
    /// Points before decimation
    pub total: usize,
    pub trend: Option<TrendLine>,
    /// Per-decile median of y at each bin's midpoint
    pub medians: Vec<OverlayPoint>,
}

/// Scatter of `y` against `x`; overlays are fitted on every point, only the
/// plotted points are decimated to `cap`.
pub fn scatter_series<'a>(
    records: impl IntoIterator<Item = &'a AnalyticsRecord>,
    x: Metric,
    y: Metric,
    filter: RowFilter,
    cap: usize,
) -> ScatterSeries {
    let mut pairs = metric_pairs(records, x, y, filter);
    if pairs.is_empty() {
        return ScatterSeries::default();
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let edges = decile_edges(&sorted_finite(pairs.iter().map(|(x, _)| *x)));
    let medians = edges
        .windows(2)
        .zip(group_by_bin(&pairs, &edges))
        .map(|(pair, mut ys)| {
            ys.sort_by(f64::total_cmp);
            OverlayPoint {
                x: (pair[0] + pair[1]) / 2.0,
                y: if ys.len() >= MIN_BUCKET_SAMPLES { median(&ys) } else { None },
            }
        })
        .collect();

    ScatterSeries {
        trend: least_squares(&pairs),
        total: pairs.len(),
        points: lttb::decimate(&pairs, cap),
        medians,
    }
}

/// y values grouped by the bin of their x
fn group_by_bin(pairs: &[(f64, f64)], edges: &[f64]) -> Vec<Vec<f64>> {
    let mut groups = vec![Vec::new(); bin_count(edges)];
    for (x, y) in pairs {
        if let Some(index) = bin_index_of(*x, edges) {
            groups[index].push(*y);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::analytics::binning::DECILES;
    use crate::shared::types::{AiAssessment, Decision, Fundamentals, Outcome, Scores};

    fn candidate(score: f64, pnl: Option<f64>) -> AnalyticsRecord {
        AnalyticsRecord {
            scores: Scores {
                final_score: Some(score),
                ..Default::default()
            },
            outcome: Outcome {
                has_outcome: pnl.is_some(),
                pnl_pct: pnl,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_metric_value_excludes_non_finite() {
        let record = AnalyticsRecord {
            fundamentals: Fundamentals {
                volume_5m_usd: Some(f64::NAN),
                liquidity_usd: Some(25_000.0),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(Metric::Volume5m.value(&record), None);
        assert_eq!(Metric::LiquidityUsd.value(&record), Some(25_000.0));
        assert_eq!(Metric::PnlPct.value(&record), None);
    }

    #[test]
    fn test_metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>(), Ok(metric));
        }
        assert!("volume_7m".parse::<Metric>().is_err());
    }

    #[test]
    fn test_outcome_filter_restricts_rows() {
        let records = vec![
            candidate(1.0, Some(5.0)),
            candidate(2.0, None),
            candidate(3.0, Some(-1.0)),
        ];

        let all = metric_histogram(&records, Metric::FinalScore, RowFilter::All, 4);
        let closed = metric_histogram(&records, Metric::FinalScore, RowFilter::WithOutcome, 4);

        assert_eq!(all.total(), 3);
        assert_eq!(closed.total(), 2);
    }

    #[test]
    fn test_calibration_curve_positive_rate() {
        let probe = |probability: f64, action: &str| AnalyticsRecord {
            ai: AiAssessment {
                probability_tp1_before_sl: Some(probability),
                ..Default::default()
            },
            decision: Decision {
                action: Some(action.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let records = vec![
            probe(0.05, "SKIP"),
            probe(0.08, "BUY"),
            probe(0.91, "buy"),
            probe(0.95, "BUY"),
            probe(1.4, "SKIP"),
        ];

        let curve = calibration_curve(
            &records,
            Metric::AiProbability,
            "BUY",
            CALIBRATION_BUCKETS,
            RowFilter::All,
        );

        assert_eq!(curve.len(), CALIBRATION_BUCKETS);
        assert_eq!(curve[0].count, 2);
        assert_eq!(curve[0].positive_rate, Some(0.5));
        // 1.4 is clamped into the last bucket
        assert_eq!(curve[9].count, 3);
        assert_eq!(curve[9].positives, 2);
        assert_eq!(curve[5].count, 0);
        assert_eq!(curve[5].positive_rate, None);

        assert!(
            calibration_curve(&[], Metric::AiProbability, "BUY", 10, RowFilter::All).is_empty()
        );
    }

    #[test]
    fn test_score_buckets_statistics() {
        // 30 rows: 3 per decile; outcome sign flips at score 15
        let records: Vec<AnalyticsRecord> = (0..30)
            .map(|i| candidate(i as f64, Some(i as f64 - 14.5)))
            .collect();

        let buckets = score_bucket_stats(
            &records,
            Metric::FinalScore,
            Metric::PnlPct,
            RowFilter::WithOutcome,
        );

        assert_eq!(buckets.len(), DECILES);
        assert!(buckets.iter().all(|bucket| bucket.count == 3));
        assert_eq!(buckets[0].median, Some(-13.5));
        assert_eq!(buckets[0].q1, Some(-14.0));
        assert_eq!(buckets[0].q3, Some(-13.0));
        assert_eq!(buckets[0].win_rate, Some(0.0));
        assert_eq!(buckets[9].win_rate, Some(1.0));
    }

    #[test]
    fn test_sparse_score_buckets_are_gaps() {
        let records: Vec<AnalyticsRecord> = (0..20)
            .map(|i| candidate(i as f64, Some(1.0)))
            .collect();

        let buckets = score_bucket_stats(&records, Metric::FinalScore, Metric::PnlPct, RowFilter::All);

        assert_eq!(buckets.len(), DECILES);
        assert!(buckets.iter().all(|bucket| bucket.count == 2));
        assert!(buckets.iter().all(|bucket| bucket.median.is_none()));
        assert!(buckets.iter().all(|bucket| bucket.win_rate.is_none()));

        assert!(
            score_bucket_stats(&[], Metric::FinalScore, Metric::PnlPct, RowFilter::All).is_empty()
        );
    }

    #[test]
    fn test_heatmap_aggregates_and_notable_cells() {
        let row = |quality: f64, liquidity: f64, pnl: f64| AnalyticsRecord {
            scores: Scores {
                quality: Some(quality),
                ..Default::default()
            },
            fundamentals: Fundamentals {
                liquidity_usd: Some(liquidity),
                ..Default::default()
            },
            outcome: Outcome {
                has_outcome: true,
                pnl_pct: Some(pnl),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut records = Vec::new();
        // Low quality, low liquidity: mean 1
        records.extend([row(0.0, 0.0, 0.0), row(0.1, 0.1, 1.0), row(0.2, 0.2, 2.0)]);
        // High quality, low liquidity: mean 10
        records.extend([row(1.0, 0.0, 9.0), row(0.9, 0.1, 10.0), row(0.8, 0.2, 11.0)]);
        // High quality, high liquidity: mean 9.5, within 10% of best
        records.extend([row(1.0, 1.0, 9.0), row(0.9, 0.9, 9.5), row(0.8, 0.8, 10.0)]);
        // Low quality, high liquidity: single outlier, not enough samples to be best
        records.push(row(0.0, 1.0, 50.0));

        let spec = HeatmapSpec {
            x: Metric::QualityScore,
            y: Metric::LiquidityUsd,
            z: Metric::PnlPct,
            x_binning: Binning::EqualWidth(2),
            y_binning: Binning::EqualWidth(2),
            aggregate: Aggregate::Mean,
            filter: RowFilter::WithOutcome,
        };

        let map = heatmap(&records, &spec);

        assert_eq!(map.cells.len(), 2);
        assert_eq!(map.cells[0].len(), 2);
        assert_eq!(map.cells[0][0].count, 3);
        assert_eq!(map.cells[0][0].value, Some(1.0));
        assert_eq!(map.cells[0][1].value, Some(10.0));
        assert_eq!(map.cells[1][1].value, Some(9.5));
        assert_eq!(map.cells[1][0].count, 1);
        assert_eq!(map.cells[1][0].value, Some(50.0));

        assert_eq!(map.best, Some((0, 1)));
        assert!(map.cells[0][1].notable);
        assert!(map.cells[1][1].notable);
        assert!(!map.cells[0][0].notable);
        assert!(!map.cells[1][0].notable);

        let median_map = heatmap(
            &records,
            &HeatmapSpec {
                aggregate: Aggregate::Median,
                ..spec
            },
        );
        assert_eq!(median_map.cells[1][1].value, Some(9.5));

        assert!(heatmap(&[], &spec).is_empty());
    }

    #[test]
    fn test_scatter_overlays_use_undecimated_points() {
        let records: Vec<AnalyticsRecord> = (0..2000)
            .map(|i| candidate(i as f64, Some(2.0 * i as f64 + 1.0)))
            .collect();

        let series = scatter_series(&records, Metric::FinalScore, Metric::PnlPct, RowFilter::All, 600);

        assert_eq!(series.total, 2000);
        assert_eq!(series.points.len(), 600);
        assert_eq!(series.points.first(), Some(&(0.0, 1.0)));
        assert_eq!(series.points.last(), Some(&(1999.0, 3999.0)));

        let trend = series.trend.unwrap();
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.intercept - 1.0).abs() < 1e-6);
        assert_eq!((trend.x_min, trend.x_max), (0.0, 1999.0));

        assert_eq!(series.medians.len(), DECILES);
        assert!(series.medians.iter().all(|point| point.y.is_some()));
    }

    #[test]
    fn test_scatter_degenerate_inputs() {
        assert_eq!(
            scatter_series(&[], Metric::Rank, Metric::PnlPct, RowFilter::All, 600),
            ScatterSeries::default()
        );

        // Vertical line has no least-squares fit
        let records = vec![candidate(1.0, Some(1.0)), candidate(1.0, Some(2.0))];
        let series = scatter_series(&records, Metric::FinalScore, Metric::PnlPct, RowFilter::All, 600);
        assert_eq!(series.total, 2);
        assert!(series.trend.is_none());
        assert_eq!(series.medians.len(), 1);
        assert_eq!(series.medians[0].y, None);
    }

    #[test]
    fn test_position_change_histogram() {
        let positions = vec![
            Position {
                entry: Some(100.0),
                last_price: Some(110.0),
                ..Default::default()
            },
            Position {
                change_pct: Some(-20.0),
                ..Default::default()
            },
            Position::default(),
        ];

        let histogram = position_change_histogram(&positions, 4);
        assert_eq!(histogram.total(), 2);
        assert_eq!(histogram.edges.first(), Some(&-20.0));
        assert_eq!(histogram.edges.last(), Some(&10.0));
    }
}
