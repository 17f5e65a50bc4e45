//! Visibility-gated chart registry.
//!
//! Charts are only computed while visible, and only when the store slice they
//! read has moved past the revision they were last computed at. A chart that
//! becomes visible for the first time is computed on the next refresh.

use crate::shared::analytics::binning::{HISTOGRAM_BINS, Histogram};
use crate::shared::analytics::charts::{
    Aggregate, Binning, CALIBRATION_BUCKETS, CalibrationBucket, Heatmap, HeatmapSpec, Metric,
    RowFilter, ScatterSeries, ScoreBucket, calibration_curve, heatmap, metric_histogram,
    position_change_histogram, scatter_series, score_bucket_stats,
};
use crate::shared::store::{LiveStore, SliceRevisions, StoreSnapshot};
use crate::shared::types::{AnalyticsRecord, Position};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Decision action counted as positive by the calibration chart
pub const BUY_ACTION: &str = "BUY";

/// Store slice a chart is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartSource {
    Analytics,
    Positions,
}

impl ChartSource {
    fn revision(&self, revisions: &SliceRevisions) -> u64 {
        match self {
            ChartSource::Analytics => revisions.analytics,
            ChartSource::Positions => revisions.positions,
        }
    }
}

/// Definition of one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChartSpec {
    Histogram {
        metric: Metric,
        filter: RowFilter,
        bins: usize,
    },
    Calibration {
        probability: Metric,
        target_action: String,
        bins: usize,
        filter: RowFilter,
    },
    ScoreBuckets {
        score: Metric,
        outcome: Metric,
        filter: RowFilter,
    },
    Heatmap(HeatmapSpec),
    Scatter {
        x: Metric,
        y: Metric,
        filter: RowFilter,
        cap: usize,
    },
    PositionChange {
        bins: usize,
    },
}

impl ChartSpec {
    pub fn source(&self) -> ChartSource {
        match self {
            ChartSpec::PositionChange { .. } => ChartSource::Positions,
            _ => ChartSource::Analytics,
        }
    }

    pub fn compute(&self, analytics: &[AnalyticsRecord], positions: &[Position]) -> ChartOutput {
        match self {
            ChartSpec::Histogram {
                metric,
                filter,
                bins,
            } => ChartOutput::Histogram(metric_histogram(analytics, *metric, *filter, *bins)),
            ChartSpec::Calibration {
                probability,
                target_action,
                bins,
                filter,
            } => ChartOutput::Calibration(calibration_curve(
                analytics,
                *probability,
                target_action,
                *bins,
                *filter,
            )),
            ChartSpec::ScoreBuckets {
                score,
                outcome,
                filter,
            } => ChartOutput::ScoreBuckets(score_bucket_stats(analytics, *score, *outcome, *filter)),
            ChartSpec::Heatmap(spec) => ChartOutput::Heatmap(heatmap(analytics, spec)),
            ChartSpec::Scatter { x, y, filter, cap } => {
                ChartOutput::Scatter(scatter_series(analytics, *x, *y, *filter, *cap))
            }
            ChartSpec::PositionChange { bins } => {
                ChartOutput::Histogram(position_change_histogram(positions, *bins))
            }
        }
    }
}

/// Computed series of one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChartOutput {
    Histogram(Histogram),
    Calibration(Vec<CalibrationBucket>),
    ScoreBuckets(Vec<ScoreBucket>),
    Heatmap(Heatmap),
    Scatter(ScatterSeries),
}

impl ChartOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartOutput::Histogram(histogram) => histogram.is_empty(),
            ChartOutput::Calibration(buckets) => buckets.is_empty(),
            ChartOutput::ScoreBuckets(buckets) => buckets.is_empty(),
            ChartOutput::Heatmap(map) => map.is_empty(),
            ChartOutput::Scatter(series) => series.total == 0,
        }
    }
}

#[derive(Debug)]
struct ChartEntry {
    spec: ChartSpec,
    visible: bool,
    computed_at: Option<u64>,
    output: Option<ChartOutput>,
}

impl ChartEntry {
    fn new(spec: ChartSpec) -> Self {
        Self {
            spec,
            visible: false,
            computed_at: None,
            output: None,
        }
    }

    fn is_stale(&self, revisions: &SliceRevisions) -> bool {
        self.computed_at != Some(self.spec.source().revision(revisions))
    }
}

#[derive(Debug, Default)]
pub struct AnalyticsEngine {
    charts: BTreeMap<String, ChartEntry>,
}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine preloaded with the dashboard's standard charts (all hidden).
    pub fn with_default_charts(scatter_cap: usize) -> Self {
        let mut engine = Self::new();

        engine.register(
            "final_score_histogram",
            ChartSpec::Histogram {
                metric: Metric::FinalScore,
                filter: RowFilter::All,
                bins: HISTOGRAM_BINS,
            },
        );
        engine.register(
            "pnl_histogram",
            ChartSpec::Histogram {
                metric: Metric::PnlPct,
                filter: RowFilter::WithOutcome,
                bins: HISTOGRAM_BINS,
            },
        );
        engine.register(
            "ai_calibration",
            ChartSpec::Calibration {
                probability: Metric::AiProbability,
                target_action: BUY_ACTION.to_string(),
                bins: CALIBRATION_BUCKETS,
                filter: RowFilter::All,
            },
        );
        engine.register(
            "score_buckets",
            ChartSpec::ScoreBuckets {
                score: Metric::FinalScore,
                outcome: Metric::PnlPct,
                filter: RowFilter::WithOutcome,
            },
        );
        engine.register(
            "quality_liquidity_heatmap",
            ChartSpec::Heatmap(HeatmapSpec {
                x: Metric::QualityScore,
                y: Metric::LiquidityUsd,
                z: Metric::PnlPct,
                x_binning: Binning::EqualWidth(8),
                y_binning: Binning::EqualWidth(6),
                aggregate: Aggregate::Mean,
                filter: RowFilter::WithOutcome,
            }),
        );
        engine.register(
            "score_pnl_scatter",
            ChartSpec::Scatter {
                x: Metric::FinalScore,
                y: Metric::PnlPct,
                filter: RowFilter::WithOutcome,
                cap: scatter_cap,
            },
        );
        engine.register(
            "position_change",
            ChartSpec::PositionChange {
                bins: HISTOGRAM_BINS,
            },
        );

        engine
    }

    /// Add or redefine a chart; a redefined chart keeps its visibility and is recomputed.
    pub fn register(&mut self, id: impl Into<String>, spec: ChartSpec) {
        let id = id.into();
        match self.charts.get_mut(&id) {
            Some(entry) => {
                entry.spec = spec;
                entry.computed_at = None;
            }
            None => {
                self.charts.insert(id, ChartEntry::new(spec));
            }
        }
    }

    pub fn spec(&self, id: &str) -> Option<&ChartSpec> {
        self.charts.get(id).map(|entry| &entry.spec)
    }

    /// Show or hide a chart. Returns `false` for unknown ids.
    pub fn set_visible(&mut self, id: &str, visible: bool) -> bool {
        match self.charts.get_mut(id) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.charts.get(id).is_some_and(|entry| entry.visible)
    }

    pub fn chart_ids(&self) -> impl Iterator<Item = &str> {
        self.charts.keys().map(String::as_str)
    }

    /// Last computed output; hidden charts keep their previous result.
    pub fn output(&self, id: &str) -> Option<&ChartOutput> {
        self.charts.get(id).and_then(|entry| entry.output.as_ref())
    }

    /// Recompute visible, stale charts. Returns the ids that were recomputed.
    pub fn refresh(&mut self, store: &LiveStore) -> Vec<String> {
        self.refresh_from(store.analytics(), store.positions(), store.revisions())
    }

    /// Same as [`AnalyticsEngine::refresh`] from an owned snapshot, so the
    /// store lock need not be held while computing.
    pub fn refresh_snapshot(&mut self, snapshot: &StoreSnapshot) -> Vec<String> {
        self.refresh_from(&snapshot.analytics, &snapshot.positions, snapshot.revisions)
    }

    fn refresh_from(
        &mut self,
        analytics: &[AnalyticsRecord],
        positions: &[Position],
        revisions: SliceRevisions,
    ) -> Vec<String> {
        let mut recomputed = Vec::new();

        for (id, entry) in self
            .charts
            .iter_mut()
            .filter(|(_, entry)| entry.visible && entry.is_stale(&revisions))
        {
            let output = entry.spec.compute(analytics, positions);
            debug!(chart = %id, empty = output.is_empty(), "recomputed chart");

            entry.output = Some(output);
            entry.computed_at = Some(entry.spec.source().revision(&revisions));
            recomputed.push(id.clone());
        }

        recomputed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analytics_frame(scores: &[f64]) -> String {
        let records: Vec<_> = scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                json!({
                    "id": format!("r{i}"),
                    "scores": {"final": score},
                    "outcome": {"hasOutcome": true, "pnlPct": score - 5.0}
                })
            })
            .collect();
        json!({"type": "analytics", "payload": records}).to_string()
    }

    #[test]
    fn test_hidden_charts_are_not_computed() {
        let store = LiveStore::new();
        let mut engine = AnalyticsEngine::with_default_charts(600);

        assert!(engine.refresh(&store).is_empty());
        assert!(engine.output("final_score_histogram").is_none());
    }

    #[test]
    fn test_first_visibility_computes_once_per_revision() {
        let mut store = LiveStore::new();
        store.apply_frame(&analytics_frame(&[1.0, 2.0, 3.0, 4.0]));

        let mut engine = AnalyticsEngine::with_default_charts(600);
        assert!(engine.set_visible("final_score_histogram", true));
        assert!(!engine.set_visible("does_not_exist", true));

        assert_eq!(engine.refresh(&store), vec!["final_score_histogram".to_string()]);
        // Nothing changed since
        assert!(engine.refresh(&store).is_empty());

        match engine.output("final_score_histogram") {
            Some(ChartOutput::Histogram(histogram)) => assert_eq!(histogram.total(), 4),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_only_dependent_charts_recompute() {
        let mut store = LiveStore::new();
        store.apply_frame(&analytics_frame(&[1.0, 2.0, 3.0]));

        let mut engine = AnalyticsEngine::with_default_charts(600);
        engine.set_visible("pnl_histogram", true);
        engine.set_visible("position_change", true);
        assert_eq!(engine.refresh(&store).len(), 2);

        store.apply_frame(
            &json!({
                "type": "positions",
                "payload": [{"address": "0xA", "entry": 1, "lastPrice": 2}]
            })
            .to_string(),
        );
        assert_eq!(engine.refresh(&store), vec!["position_change".to_string()]);

        store.apply_frame(&analytics_frame(&[7.0]));
        assert_eq!(engine.refresh(&store), vec!["pnl_histogram".to_string()]);
    }

    #[test]
    fn test_redefining_a_chart_recomputes_it() {
        let mut store = LiveStore::new();
        store.apply_frame(&analytics_frame(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));

        let mut engine = AnalyticsEngine::with_default_charts(600);
        engine.set_visible("quality_liquidity_heatmap", true);
        engine.refresh(&store);

        engine.register(
            "quality_liquidity_heatmap",
            ChartSpec::Heatmap(HeatmapSpec {
                x: Metric::FinalScore,
                y: Metric::FinalScore,
                z: Metric::PnlPct,
                x_binning: Binning::Deciles,
                y_binning: Binning::EqualWidth(2),
                aggregate: Aggregate::Median,
                filter: RowFilter::WithOutcome,
            }),
        );
        assert!(engine.is_visible("quality_liquidity_heatmap"));
        assert_eq!(engine.refresh(&store).len(), 1);

        match engine.output("quality_liquidity_heatmap") {
            Some(ChartOutput::Heatmap(map)) => assert_eq!(map.y_edges.len(), 3),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_refresh_from_snapshot() {
        let mut store = LiveStore::new();
        store.apply_frame(&analytics_frame(&[0.0, 10.0]));

        let mut engine = AnalyticsEngine::with_default_charts(1);
        engine.set_visible("score_pnl_scatter", true);
        engine.refresh_snapshot(&store.snapshot());

        match engine.output("score_pnl_scatter") {
            Some(ChartOutput::Scatter(series)) => {
                assert_eq!(series.total, 2);
                assert_eq!(series.points.len(), 1);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }
}
