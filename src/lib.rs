//! plotstats: zonal statistics for site plots over raster time series
//!
//! Extracts per-zone summary statistics from every band of every image in a
//! product family, merges the band tables into one wide table per
//! (site, image), applies product-specific offset correction and writes one
//! CSV per site.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionWindow, BandRow, BandTable, GeoTransform, Image, MergedRow, MergedTable,
    StatField, StatisticTuple, Zone, ZoneSet, ZonalError, ZonalResult,
};

pub use config::{OffsetCorrection, ProductConfig, RunConfig};
pub use io::{ImageCatalog, RasterReader, ZoneReader};
pub use pipeline::{run_products, ProductPipeline, ProductReport, RunContext};
