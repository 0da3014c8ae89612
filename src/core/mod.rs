//! Core zonal statistics modules

pub mod assembler;
pub mod band_merge;
pub mod correction;
pub mod date_decoder;
pub mod rasterize;
pub mod site_writer;
pub mod zonal_stats;

// Re-export main types
pub use assembler::{build_band_rows, BandAssembler};
pub use band_merge::merge_band_tables;
pub use correction::OffsetCorrector;
pub use date_decoder::DateDecoder;
pub use rasterize::{PixelWindow, RasterGrid};
pub use site_writer::SiteWriter;
pub use zonal_stats::{compute_statistics, ZonalStatsExtractor};
