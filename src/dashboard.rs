//! Dashboard Boundary Module
//! Accepts the interactive layer's three filter inputs and returns one chart
//! specification per dashboard slot. This module never talks to widgets.

use crate::charts::{filter_by_set, ChartBuilder, ChartError, ChartSpec, MetricMode};
use crate::data::{i32_values, str_values, DataProcessor};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Emitter count for the ranking charts.
const TOP_N: usize = 15;
/// Trailing window of the heatmap slot.
const HEATMAP_YEARS: usize = 10;
/// Fallback country count when no countries are selected.
const DEFAULT_COUNTRIES: usize = 10;

/// Filter inputs supplied by the interactive layer. An empty set means "no
/// filter" for that dimension; the year range is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub countries: Vec<String>,
    pub sectors: Vec<String>,
    pub years: Option<(i32, i32)>,
}

/// The dashboard's chart slots. Every filter change regenerates all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartSlot {
    GlobalTrend,
    TopEmitters,
    SectoralBreakdown,
    CountryTrends,
    SectoralTrend,
    GrowthRanking,
    AnimatedMap,
    SharePie,
    Comparison,
    Heatmap,
}

pub const CHART_SLOTS: [ChartSlot; 10] = [
    ChartSlot::GlobalTrend,
    ChartSlot::TopEmitters,
    ChartSlot::SectoralBreakdown,
    ChartSlot::CountryTrends,
    ChartSlot::SectoralTrend,
    ChartSlot::GrowthRanking,
    ChartSlot::AnimatedMap,
    ChartSlot::SharePie,
    ChartSlot::Comparison,
    ChartSlot::Heatmap,
];

/// One filled dashboard slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardChart {
    pub slot: ChartSlot,
    pub spec: ChartSpec,
}

/// Restrict the table to the selection. Membership is exact, never fuzzy.
pub fn apply_filters(
    df: &DataFrame,
    selection: &FilterSelection,
) -> Result<DataFrame, ChartError> {
    let mut filtered = df.clone();

    if !selection.countries.is_empty() {
        filtered = filter_by_set(&filtered, "country", &selection.countries)?;
    }
    if !selection.sectors.is_empty() {
        filtered = filter_by_set(&filtered, "sector", &selection.sectors)?;
    }
    if let Some((lo, hi)) = selection.years {
        filtered = filtered
            .lazy()
            .filter(col("year").gt_eq(lit(lo)).and(col("year").lt_eq(lit(hi))))
            .collect()?;
    }

    Ok(filtered)
}

/// Filter once, then build every chart slot from the filtered table. The
/// builders are pure and independent, so the slots are computed in parallel.
pub fn build_dashboard(
    df: &DataFrame,
    selection: &FilterSelection,
) -> Result<Vec<DashboardChart>, ChartError> {
    let filtered = apply_filters(df, selection)?;

    // country-scoped slots fall back to the current top emitters
    let countries = if selection.countries.is_empty() {
        top_country_names(&filtered, DEFAULT_COUNTRIES)?
    } else {
        selection.countries.clone()
    };
    let latest_year = match selection.years {
        Some((_, hi)) => Some(hi),
        None => i32_values(&filtered, "year")?.into_iter().flatten().max(),
    };

    CHART_SLOTS
        .par_iter()
        .map(|&slot| {
            let spec = match slot {
                ChartSlot::GlobalTrend => ChartBuilder::global_trend(&filtered)?,
                ChartSlot::TopEmitters => {
                    ChartBuilder::top_emitters_bar(&filtered, TOP_N, latest_year)?
                }
                ChartSlot::SectoralBreakdown => {
                    ChartBuilder::sectoral_breakdown_bar(&filtered, None)?
                }
                ChartSlot::CountryTrends => ChartBuilder::country_trends(&filtered, &countries)?,
                ChartSlot::SectoralTrend => ChartBuilder::sectoral_trend(&filtered)?,
                ChartSlot::GrowthRanking => ChartBuilder::growth_rate_ranking(&filtered, TOP_N)?,
                ChartSlot::AnimatedMap => ChartBuilder::animated_map(&filtered)?,
                ChartSlot::SharePie => ChartBuilder::share_pie(&filtered, &countries, None)?,
                ChartSlot::Comparison => {
                    ChartBuilder::comparison(&filtered, &countries, MetricMode::Total)?
                }
                ChartSlot::Heatmap => {
                    ChartBuilder::heatmap(&filtered, &countries, HEATMAP_YEARS)?
                }
            };
            Ok(DashboardChart { slot, spec })
        })
        .collect()
}

fn top_country_names(df: &DataFrame, n: usize) -> Result<Vec<String>, ChartError> {
    let top = DataProcessor::top_emitters(df, n, None)?;
    Ok(str_values(&top, "country")?.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        let rows: &[(&str, &str, i32, f64)] = &[
            ("A", "Energy", 2019, 10.0),
            ("A", "Energy", 2020, 100.0),
            ("A", "Transport", 2020, 50.0),
            ("B", "Energy", 2020, 50.0),
            ("B", "Energy", 2021, 60.0),
        ];
        DataFrame::new(vec![
            Column::new(
                "country".into(),
                rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            ),
            Column::new("sector".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
            Column::new("year".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
            Column::new("value".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    #[test]
    fn empty_selection_filters_nothing() {
        let df = sample_df();
        let filtered = apply_filters(&df, &FilterSelection::default()).unwrap();
        assert_eq!(filtered.height(), df.height());
    }

    #[test]
    fn selection_restricts_by_set_and_range() {
        let df = sample_df();
        let selection = FilterSelection {
            countries: vec!["A".into()],
            sectors: vec!["Energy".into()],
            years: Some((2020, 2021)),
        };

        let filtered = apply_filters(&df, &selection).unwrap();
        assert_eq!(filtered.height(), 1);
        let countries = str_values(&filtered, "country").unwrap();
        assert_eq!(countries, vec![Some("A".into())]);
    }

    #[test]
    fn dashboard_fills_every_slot() {
        let charts = build_dashboard(&sample_df(), &FilterSelection::default()).unwrap();

        assert_eq!(charts.len(), CHART_SLOTS.len());
        for (chart, slot) in charts.iter().zip(CHART_SLOTS) {
            assert_eq!(chart.slot, slot);
        }

        let trend = charts
            .iter()
            .find(|c| c.slot == ChartSlot::GlobalTrend)
            .unwrap();
        assert!(matches!(trend.spec, ChartSpec::Line { .. }));

        // top emitters defaults to the selection-free latest year
        let top = charts
            .iter()
            .find(|c| c.slot == ChartSlot::TopEmitters)
            .unwrap();
        assert_eq!(top.spec.title(), "Top 15 CO2 Emitting Countries - 2021");
    }

    #[test]
    fn dashboard_serializes_for_the_render_boundary() {
        let charts = build_dashboard(&sample_df(), &FilterSelection::default()).unwrap();
        let json = serde_json::to_string(&charts).unwrap();
        assert!(json.contains("\"slot\":\"global_trend\""));
    }
}
