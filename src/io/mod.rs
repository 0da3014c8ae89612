//! I/O modules for reading zones, image catalogs and rasters, and for scratch tables

pub mod band_csv;
pub mod catalog;
pub mod raster;
pub mod zones;

pub use catalog::ImageCatalog;
pub use raster::{BandSource, RasterReader};
pub use zones::ZoneReader;
