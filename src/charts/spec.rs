//! Chart Specification Module
//! Declarative chart descriptions handed to an external rendering layer.
//!
//! A specification is a closed tagged union: every chart the dashboard can
//! show is one variant, carrying its own typed data bindings, labels and
//! layout hints. Nothing here draws pixels.

use serde::{Deserialize, Serialize};

/// Continuous color scale hint for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScale {
    Reds,
    Viridis,
}

/// One category with its aggregated value (bar charts, pie slices, maps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEntry {
    pub label: String,
    pub value: f64,
}

/// One point of a year-keyed series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub value: f64,
}

/// A named year-keyed series (one line or one stacked band).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

/// One animation frame of the choropleth: country totals for a single year.
/// Country names the renderer cannot resolve to a map region render blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFrame {
    pub year: i32,
    pub values: Vec<BarEntry>,
}

/// Country-by-year matrix of summed values. `None` cells are gaps (no data
/// for that country in that year), never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMatrix {
    /// Row labels, one per matrix row.
    pub countries: Vec<String>,
    /// Column labels, ascending.
    pub years: Vec<i32>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// Declarative description of one chart, independent of the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    HorizontalBar {
        title: String,
        x_label: String,
        y_label: String,
        bars: Vec<BarEntry>,
        color_scale: ColorScale,
        height: u32,
    },
    Bar {
        title: String,
        x_label: String,
        y_label: String,
        bars: Vec<BarEntry>,
        color_scale: ColorScale,
        height: u32,
    },
    Line {
        title: String,
        x_label: String,
        y_label: String,
        points: Vec<SeriesPoint>,
        height: u32,
    },
    MultiLine {
        title: String,
        x_label: String,
        y_label: String,
        series: Vec<Series>,
        height: u32,
    },
    StackedArea {
        title: String,
        x_label: String,
        y_label: String,
        series: Vec<Series>,
        height: u32,
    },
    Choropleth {
        title: String,
        frames: Vec<MapFrame>,
        color_scale: ColorScale,
        height: u32,
    },
    Pie {
        title: String,
        slices: Vec<BarEntry>,
        /// Donut hole fraction, 0.0 for a full pie.
        hole: f64,
        show_percent_labels: bool,
    },
    Heatmap {
        title: String,
        x_label: String,
        y_label: String,
        matrix: HeatmapMatrix,
        color_scale: ColorScale,
        height: u32,
    },
}

impl ChartSpec {
    pub fn title(&self) -> &str {
        match self {
            ChartSpec::HorizontalBar { title, .. }
            | ChartSpec::Bar { title, .. }
            | ChartSpec::Line { title, .. }
            | ChartSpec::MultiLine { title, .. }
            | ChartSpec::StackedArea { title, .. }
            | ChartSpec::Choropleth { title, .. }
            | ChartSpec::Pie { title, .. }
            | ChartSpec::Heatmap { title, .. } => title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_round_trips_through_json() {
        let spec = ChartSpec::Line {
            title: "Global CO2 Emissions Trend".into(),
            x_label: "Year".into(),
            y_label: "Total CO2 Emissions".into(),
            points: vec![SeriesPoint {
                year: 2020,
                value: 150.0,
            }],
            height: 500,
        };

        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"kind\":\"line\""));
        let back: ChartSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert_eq!(back.title(), "Global CO2 Emissions Trend");
    }
}
