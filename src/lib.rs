//! CarbonScope - CO2 emissions data pipeline & chart specification builder
//!
//! Two independent stages: a batch data processor (load, clean, derive metrics,
//! save) and a chart builder that turns a filtered emissions table into
//! declarative chart specifications for an external rendering layer.

pub mod charts;
pub mod dashboard;
pub mod data;
