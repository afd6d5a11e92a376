//! Charts module - chart specification building

mod builder;
mod spec;

pub use builder::{ChartBuilder, ChartError, MetricMode};
pub(crate) use builder::filter_by_set;
pub use spec::{
    BarEntry, ChartSpec, ColorScale, HeatmapMatrix, MapFrame, Series, SeriesPoint,
};
