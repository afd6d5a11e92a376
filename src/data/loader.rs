//! CSV Loader Module
//! Handles raw CSV loading and processed CSV persistence using Polars.

use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: PolarsError },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: PolarsError },
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Load a delimited file into a DataFrame.
///
/// Schema is inferred; dirty cells are tolerated here and dealt with during
/// cleaning. Unreadable or structurally malformed files are fatal.
pub fn load_csv(path: &Path) -> Result<DataFrame, DataSourceError> {
    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(10000))
        .with_ignore_errors(true)
        .finish()
        .and_then(|lazy| lazy.collect())
        .map_err(|source| DataSourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "loaded {} rows and {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Serialize a table to CSV, creating parent directories as needed.
/// An existing file at `path` is overwritten unconditionally.
pub fn save_csv(df: &DataFrame, path: &Path) -> Result<(), DataSourceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| DataSourceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut file = File::create(path).map_err(|source| DataSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut out = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut out)
        .map_err(|source| DataSourceError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    info!("saved {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Basic shape statistics for a loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub unique_countries: usize,
    pub unique_sectors: usize,
}

/// Summarize a raw or cleaned table. Missing columns count as zero uniques.
pub fn summarize(df: &DataFrame) -> DatasetSummary {
    let unique_count = |name: &str| {
        df.column(name)
            .ok()
            .and_then(|col| col.n_unique().ok())
            .unwrap_or(0)
    };

    DatasetSummary {
        rows: df.height(),
        columns: df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        unique_countries: unique_count("country"),
        unique_sectors: unique_count("sector"),
    }
}
