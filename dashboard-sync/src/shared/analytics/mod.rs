//! Analytics aggregation engine
//!
//! Provides:
//! - Decile and equal-width binning
//! - Histogram, calibration, score-bucket, heatmap and scatter builders
//! - LTTB decimation of large scatter series
//! - Visibility-gated chart registry driven by store revisions

pub mod binning;
pub mod charts;
pub mod engine;
pub mod lttb;

pub use binning::{Histogram, bin_index_of, decile_edges, histogram, quantile};
pub use charts::{Aggregate, Binning, HeatmapSpec, Metric, RowFilter};
pub use engine::{AnalyticsEngine, ChartOutput, ChartSpec};
pub use lttb::{DEFAULT_SCATTER_CAP, decimate};
