//! Data module - CSV loading, cleaning and aggregation

mod loader;
mod processor;

pub use loader::{load_csv, save_csv, summarize, DataSourceError, DatasetSummary};
pub use processor::{CleanReport, DataProcessor, ProcessorError};

pub(crate) use processor::{f64_values, i32_values, sort_desc, str_values, sum_grouped, yearly_totals};
