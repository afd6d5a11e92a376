//! Chart Builder Module
//! Pure functions from a (pre-filtered) emissions table to chart
//! specifications. None of them mutates its input, so they are safe to call
//! repeatedly and in parallel.

use crate::charts::spec::{
    BarEntry, ChartSpec, ColorScale, HeatmapMatrix, MapFrame, Series, SeriesPoint,
};
use crate::data::{f64_values, i32_values, sort_desc, str_values, sum_grouped, yearly_totals};
use crate::data::{DataProcessor, ProcessorError};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Aggregation mode for the country comparison chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    Total,
    Average,
}

/// Builds one chart specification per dashboard chart.
pub struct ChartBuilder;

impl ChartBuilder {
    /// Horizontal bar of the top `n` emitting countries, color-encoded by
    /// magnitude, optionally restricted to one year.
    pub fn top_emitters_bar(
        df: &DataFrame,
        n: usize,
        year: Option<i32>,
    ) -> Result<ChartSpec, ChartError> {
        let title = match year {
            Some(y) => format!("Top {n} CO2 Emitting Countries - {y}"),
            None => format!("Top {n} CO2 Emitting Countries (All Time)"),
        };

        let top = DataProcessor::top_emitters(df, n, year)?;
        Ok(ChartSpec::HorizontalBar {
            title,
            x_label: "Total CO2 Emissions".into(),
            y_label: "Country".into(),
            bars: bar_entries(&top, "country")?,
            color_scale: ColorScale::Reds,
            height: 600,
        })
    }

    /// Line chart of total emissions per year across the whole table.
    pub fn global_trend(df: &DataFrame) -> Result<ChartSpec, ChartError> {
        let points = year_sums(df)?
            .into_iter()
            .map(|(year, value)| SeriesPoint { year, value })
            .collect();

        Ok(ChartSpec::Line {
            title: "Global CO2 Emissions Trend".into(),
            x_label: "Year".into(),
            y_label: "Total CO2 Emissions".into(),
            points,
            height: 500,
        })
    }

    /// Multi-series line chart, one series per requested country.
    pub fn country_trends(df: &DataFrame, countries: &[String]) -> Result<ChartSpec, ChartError> {
        let filtered = filter_by_set(df, "country", countries)?;
        let series = yearly_totals(&filtered)?
            .into_iter()
            .map(|(name, by_year)| Series {
                name,
                points: by_year
                    .into_iter()
                    .map(|(year, value)| SeriesPoint { year, value })
                    .collect(),
            })
            .collect();

        Ok(ChartSpec::MultiLine {
            title: "CO2 Emissions Trend by Country".into(),
            x_label: "Year".into(),
            y_label: "CO2 Emissions".into(),
            series,
            height: 600,
        })
    }

    /// Bar chart of emissions per sector, optionally for one country.
    pub fn sectoral_breakdown_bar(
        df: &DataFrame,
        country: Option<&str>,
    ) -> Result<ChartSpec, ChartError> {
        let title = match country {
            Some(c) => format!("CO2 Emissions by Sector - {c}"),
            None => "Global CO2 Emissions by Sector".to_string(),
        };

        let sectors = DataProcessor::sectoral_breakdown(df, country)?;
        Ok(ChartSpec::Bar {
            title,
            x_label: "Sector".into(),
            y_label: "Total CO2 Emissions".into(),
            bars: bar_entries(&sectors, "sector")?,
            color_scale: ColorScale::Viridis,
            height: 500,
        })
    }

    /// Stacked area chart with one band per sector over the year axis.
    /// Bands are zero-filled across the axis so they stack consistently.
    pub fn sectoral_trend(df: &DataFrame) -> Result<ChartSpec, ChartError> {
        let sectors = str_values(df, "sector")?;
        let years = i32_values(df, "year")?;
        let values = f64_values(df, "value")?;

        let mut by_sector: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
        let mut axis: BTreeSet<i32> = BTreeSet::new();
        for i in 0..df.height() {
            if let (Some(s), Some(y), Some(v)) = (sectors[i].as_deref(), years[i], values[i]) {
                *by_sector
                    .entry(s.to_string())
                    .or_default()
                    .entry(y)
                    .or_insert(0.0) += v;
                axis.insert(y);
            }
        }

        let series = by_sector
            .into_iter()
            .map(|(name, by_year)| Series {
                name,
                points: axis
                    .iter()
                    .map(|&year| SeriesPoint {
                        year,
                        value: by_year.get(&year).copied().unwrap_or(0.0),
                    })
                    .collect(),
            })
            .collect();

        Ok(ChartSpec::StackedArea {
            title: "CO2 Emissions by Sector Over Time".into(),
            x_label: "Year".into(),
            y_label: "CO2 Emissions".into(),
            series,
            height: 600,
        })
    }

    /// Choropleth keyed by country name, one frame per year. Names the
    /// renderer cannot resolve to a region are its concern, not ours.
    pub fn animated_map(df: &DataFrame) -> Result<ChartSpec, ChartError> {
        let mut by_year: BTreeMap<i32, Vec<BarEntry>> = BTreeMap::new();
        for (country, years) in yearly_totals(df)? {
            for (year, value) in years {
                by_year.entry(year).or_default().push(BarEntry {
                    label: country.clone(),
                    value,
                });
            }
        }

        let frames = by_year
            .into_iter()
            .map(|(year, values)| MapFrame { year, values })
            .collect();

        Ok(ChartSpec::Choropleth {
            title: "Global CO2 Emissions Over Time".into(),
            frames,
            color_scale: ColorScale::Reds,
            height: 600,
        })
    }

    /// Horizontal bar of the `n` countries with the highest average growth
    /// rate over the most recent five years of data. Null growth values are
    /// excluded from the average; countries with no usable growth in the
    /// window are left out entirely.
    pub fn growth_rate_ranking(df: &DataFrame, n: usize) -> Result<ChartSpec, ChartError> {
        let growth_df = DataProcessor::growth_rates(df)?;
        let countries = str_values(&growth_df, "country")?;
        let years = i32_values(&growth_df, "year")?;
        let growth = f64_values(&growth_df, "growth_rate")?;

        let cutoff = years.iter().flatten().copied().max().map(|max| max - 5);

        let mut order: Vec<String> = Vec::new();
        let mut sums: HashMap<String, (f64, u32)> = HashMap::new();
        if let Some(cutoff) = cutoff {
            for i in 0..growth_df.height() {
                let (Some(country), Some(year), Some(rate)) =
                    (countries[i].as_deref(), years[i], growth[i])
                else {
                    continue;
                };
                if year < cutoff {
                    continue;
                }
                match sums.get_mut(country) {
                    Some((sum, count)) => {
                        *sum += rate;
                        *count += 1;
                    }
                    None => {
                        order.push(country.to_string());
                        sums.insert(country.to_string(), (rate, 1));
                    }
                }
            }
        }

        let mut rows: Vec<(String, f64)> = order
            .into_iter()
            .map(|country| {
                let (sum, count) = sums[&country];
                (country, sum / count as f64)
            })
            .collect();
        sort_desc(&mut rows);
        rows.truncate(n);

        Ok(ChartSpec::HorizontalBar {
            title: format!("Top {n} Countries by Average CO2 Growth Rate (Last 5 Years)"),
            x_label: "Average Growth Rate (%)".into(),
            y_label: "Country".into(),
            bars: rows
                .into_iter()
                .map(|(label, value)| BarEntry { label, value })
                .collect(),
            color_scale: ColorScale::Reds,
            height: 600,
        })
    }

    /// Donut pie of the selected countries' emission shares, optionally for
    /// one year.
    pub fn share_pie(
        df: &DataFrame,
        countries: &[String],
        year: Option<i32>,
    ) -> Result<ChartSpec, ChartError> {
        let title = match year {
            Some(y) => format!("CO2 Emissions Share - {y}"),
            None => "CO2 Emissions Share (All Time)".to_string(),
        };

        let scoped = match year {
            Some(y) => df.clone().lazy().filter(col("year").eq(lit(y))).collect()?,
            None => df.clone(),
        };
        let filtered = filter_by_set(&scoped, "country", countries)?;

        let keys = str_values(&filtered, "country")?;
        let values = f64_values(&filtered, "value")?;
        let slices = sum_grouped(&keys, &values)
            .into_iter()
            .map(|(label, value)| BarEntry { label, value })
            .collect();

        Ok(ChartSpec::Pie {
            title,
            slices,
            hole: 0.4,
            show_percent_labels: true,
        })
    }

    /// Bar comparison of the selected countries by total or average value.
    pub fn comparison(
        df: &DataFrame,
        countries: &[String],
        metric: MetricMode,
    ) -> Result<ChartSpec, ChartError> {
        let filtered = filter_by_set(df, "country", countries)?;
        let keys = str_values(&filtered, "country")?;
        let values = f64_values(&filtered, "value")?;

        let (title, y_label, bars) = match metric {
            MetricMode::Total => (
                "Total CO2 Emissions Comparison",
                "Total Emissions",
                sum_grouped(&keys, &values),
            ),
            MetricMode::Average => (
                "Average CO2 Emissions Comparison",
                "Average Emissions",
                mean_grouped(&keys, &values),
            ),
        };

        Ok(ChartSpec::Bar {
            title: title.into(),
            x_label: "Country".into(),
            y_label: y_label.into(),
            bars: bars
                .into_iter()
                .map(|(label, value)| BarEntry { label, value })
                .collect(),
            color_scale: ColorScale::Reds,
            height: 500,
        })
    }

    /// Country-by-year heatmap over the trailing `n_years` window. Missing
    /// cells stay empty (no data), never zero.
    pub fn heatmap(
        df: &DataFrame,
        countries: &[String],
        n_years: usize,
    ) -> Result<ChartSpec, ChartError> {
        let filtered = filter_by_set(df, "country", countries)?;

        let max_year = i32_values(&filtered, "year")?
            .into_iter()
            .flatten()
            .max();
        let windowed = match max_year {
            Some(max) => filtered
                .lazy()
                .filter(col("year").gt_eq(lit(max - n_years as i32 + 1)))
                .collect()?,
            None => filtered,
        };

        let totals = yearly_totals(&windowed)?;
        let years: Vec<i32> = totals
            .values()
            .flat_map(|by_year| by_year.keys().copied())
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();
        let row_labels: Vec<String> = totals.keys().cloned().collect();
        let cells: Vec<Vec<Option<f64>>> = row_labels
            .iter()
            .map(|country| {
                years
                    .iter()
                    .map(|year| totals[country].get(year).copied())
                    .collect()
            })
            .collect();

        Ok(ChartSpec::Heatmap {
            title: format!("CO2 Emissions Heatmap (Last {n_years} Years)"),
            x_label: "Year".into(),
            y_label: "Country".into(),
            matrix: HeatmapMatrix {
                countries: row_labels,
                years,
                cells,
            },
            color_scale: ColorScale::Reds,
            height: 600,
        })
    }
}

/// Keep only rows whose `column` value is in `keep` (exact membership).
pub(crate) fn filter_by_set(
    df: &DataFrame,
    column: &str,
    keep: &[String],
) -> Result<DataFrame, ChartError> {
    let set: HashSet<&str> = keep.iter().map(String::as_str).collect();
    let values = str_values(df, column)?;
    let mask: BooleanChunked = values
        .iter()
        .map(|v| Some(v.as_deref().is_some_and(|s| set.contains(s))))
        .collect();
    Ok(df.filter(&mask)?)
}

fn bar_entries(df: &DataFrame, key: &str) -> Result<Vec<BarEntry>, ChartError> {
    let labels = str_values(df, key)?;
    let totals = f64_values(df, "total_emissions")?;
    Ok(labels
        .into_iter()
        .zip(totals)
        .filter_map(|(label, value)| {
            Some(BarEntry {
                label: label?,
                value: value?,
            })
        })
        .collect())
}

fn year_sums(df: &DataFrame) -> Result<BTreeMap<i32, f64>, ChartError> {
    let years = i32_values(df, "year")?;
    let values = f64_values(df, "value")?;

    let mut sums: BTreeMap<i32, f64> = BTreeMap::new();
    for (year, value) in years.into_iter().zip(values) {
        if let (Some(year), Some(value)) = (year, value) {
            *sums.entry(year).or_insert(0.0) += value;
        }
    }
    Ok(sums)
}

fn mean_grouped(keys: &[Option<String>], values: &[Option<f64>]) -> Vec<(String, f64)> {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, (f64, u32)> = HashMap::new();

    for (key, value) in keys.iter().zip(values) {
        let (Some(key), Some(value)) = (key.as_deref(), *value) else {
            continue;
        };
        match sums.get_mut(key) {
            Some((sum, count)) => {
                *sum += value;
                *count += 1;
            }
            None => {
                order.push(key.to_string());
                sums.insert(key.to_string(), (value, 1));
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let (sum, count) = sums[&key];
            (key, sum / count as f64)
        })
        .collect()
}
