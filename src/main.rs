//! CarbonScope - CO2 emissions data pipeline & chart specification builder
//!
//! `process` runs the batch cleaning pipeline over a raw emissions CSV;
//! `charts` builds the dashboard chart specifications from a processed table
//! and emits them as JSON for the rendering layer.

use anyhow::{bail, Context, Result};
use carbonscope::dashboard::{build_dashboard, FilterSelection};
use carbonscope::data::{self, DataProcessor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "carbonscope",
    version,
    about = "CO2 emissions analysis: clean data, derive metrics, build chart specs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean a raw emissions CSV and persist the processed table
    Process {
        /// Raw delimited input with country, sector, date, value columns
        #[arg(long, default_value = "data/raw/dataset.csv")]
        input: PathBuf,
        /// Destination for the processed CSV
        #[arg(long, default_value = "data/processed/co2_emissions_processed.csv")]
        output: PathBuf,
        /// Optional population table (country, year, population)
        #[arg(long)]
        population: Option<PathBuf>,
        /// Optional GDP table (country, year, gdp)
        #[arg(long)]
        gdp: Option<PathBuf>,
        /// How many top emitters to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Build all dashboard chart specs from a processed CSV, as JSON
    Charts {
        /// Processed CSV produced by `process`
        #[arg(long)]
        input: PathBuf,
        /// Comma-separated country filter (empty = all)
        #[arg(long, value_delimiter = ',')]
        countries: Vec<String>,
        /// Comma-separated sector filter (empty = all)
        #[arg(long, value_delimiter = ',')]
        sectors: Vec<String>,
        /// Inclusive lower bound of the year range
        #[arg(long)]
        year_min: Option<i32>,
        /// Inclusive upper bound of the year range
        #[arg(long)]
        year_max: Option<i32>,
        /// Write the JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Process {
            input,
            output,
            population,
            gdp,
            top,
        } => run_process(&input, &output, population, gdp, top),
        Command::Charts {
            input,
            countries,
            sectors,
            year_min,
            year_max,
            output,
        } => run_charts(&input, countries, sectors, year_min, year_max, output),
    }
}

fn run_process(
    input: &PathBuf,
    output: &PathBuf,
    population: Option<PathBuf>,
    gdp: Option<PathBuf>,
    top: usize,
) -> Result<()> {
    let raw = data::load_csv(input)?;
    let summary = data::summarize(&raw);
    println!(
        "Loaded {} rows, {} columns ({} countries, {} sectors)",
        summary.rows,
        summary.columns.len(),
        summary.unique_countries,
        summary.unique_sectors
    );

    let (cleaned, report) = DataProcessor::clean(&raw)?;
    println!(
        "Removed {} of {} rows with missing critical values",
        report.rows_dropped, report.rows_in
    );

    let population = population.map(|p| data::load_csv(&p)).transpose()?;
    let gdp = gdp.map(|p| data::load_csv(&p)).transpose()?;
    let enriched = DataProcessor::derive_metrics(&cleaned, population.as_ref(), gdp.as_ref())?;

    let top_df = DataProcessor::top_emitters(&cleaned, top, None)?;
    println!("\nTop {top} emitters (all time):\n{top_df}");

    data::save_csv(&enriched, output)?;
    println!("Saved processed data to {}", output.display());
    Ok(())
}

fn run_charts(
    input: &PathBuf,
    countries: Vec<String>,
    sectors: Vec<String>,
    year_min: Option<i32>,
    year_max: Option<i32>,
    output: Option<PathBuf>,
) -> Result<()> {
    let years = match (year_min, year_max) {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        (None, None) => None,
        _ => bail!("--year-min and --year-max must be given together"),
    };

    let loaded = data::load_csv(input)?;
    // tolerate a raw file: clean it on the fly if the derived columns are absent
    let table = if loaded.column("year").is_err() {
        DataProcessor::clean(&loaded)?.0
    } else {
        loaded
    };

    let selection = FilterSelection {
        countries,
        sectors,
        years,
    };
    let charts = build_dashboard(&table, &selection)?;
    let json = serde_json::to_string_pretty(&charts)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {} chart specs to {}", charts.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
