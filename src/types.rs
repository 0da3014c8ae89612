use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Affine transform of a north-up raster grid (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six coefficients returned by `Dataset::geo_transform`
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Fractional (col, row) of a map coordinate
    pub fn map_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.top_left_x) / self.pixel_width,
            (y - self.top_left_y) / self.pixel_height,
        )
    }

    /// Map coordinate of the upper-left corner of pixel (col, row)
    pub fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width,
            self.top_left_y + row * self.pixel_height,
        )
    }
}

/// A fixed-area site plot that statistics are aggregated over
#[derive(Debug, Clone)]
pub struct Zone {
    pub uid: i64,
    pub site_name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Ordered zones read from one vector file
#[derive(Debug, Clone)]
pub struct ZoneSet {
    pub zones: Vec<Zone>,
    /// WKT of the layer's spatial reference, if the layer declares one
    pub srs_wkt: Option<String>,
}

impl ZoneSet {
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// One raster file of a product family
#[derive(Debug, Clone)]
pub struct Image {
    pub path: PathBuf,
    /// File name component, used as the image identity in every table
    pub name: String,
    pub nodata: f64,
    /// Second-to-last `_`-delimited token of the file name
    pub filename_token: String,
    pub window: AcquisitionWindow,
}

/// Statistic fields in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatField {
    Count,
    Min,
    Max,
    Mean,
    #[serde(alias = "med")]
    Median,
    Std,
    P25,
    P50,
    P75,
    P95,
    P99,
    Range,
}

impl StatField {
    pub const ALL: [StatField; 12] = [
        StatField::Count,
        StatField::Min,
        StatField::Max,
        StatField::Mean,
        StatField::Median,
        StatField::Std,
        StatField::P25,
        StatField::P50,
        StatField::P75,
        StatField::P95,
        StatField::P99,
        StatField::Range,
    ];

    /// Column suffix used in CSV headers
    pub fn suffix(&self) -> &'static str {
        match self {
            StatField::Count => "count",
            StatField::Min => "min",
            StatField::Max => "max",
            StatField::Mean => "mean",
            StatField::Median => "med",
            StatField::Std => "std",
            StatField::P25 => "p25",
            StatField::P50 => "p50",
            StatField::P75 => "p75",
            StatField::P95 => "p95",
            StatField::P99 => "p99",
            StatField::Range => "range",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// Column name of one statistic for one band, e.g. `b2_dbi_p95`
pub fn stat_column(band: usize, variable: &str, field: StatField) -> String {
    format!("b{}_{}_{}", band, variable, field.suffix())
}

/// Statistics of one (zone, image, band); `None` is a missing value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticTuple {
    values: [Option<f64>; 12],
}

impl StatisticTuple {
    /// Tuple for a zone without any valid pixel
    pub fn empty() -> Self {
        let mut values = [None; 12];
        values[StatField::Count.index()] = Some(0.0);
        Self { values }
    }

    pub fn get(&self, field: StatField) -> Option<f64> {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: StatField, value: Option<f64>) {
        self.values[field.index()] = value;
    }

    pub fn count(&self) -> u64 {
        self.get(StatField::Count).map(|c| c as u64).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Acquisition window decoded from an image file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionWindow {
    pub start_year: String,
    pub start_month: String,
    pub start_day: String,
    pub start_date: String,
    pub end_year: String,
    pub end_month: String,
    pub end_day: String,
    pub end_date: String,
}

/// One zone's statistics for a fixed band of one image
#[derive(Debug, Clone, PartialEq)]
pub struct BandRow {
    pub uid: i64,
    pub site_name: String,
    pub window: AcquisitionWindow,
    pub stats: StatisticTuple,
    pub image: String,
    pub band: usize,
    pub date_token: String,
}

/// Every row of one band, images in catalog order and zones in provider order
#[derive(Debug, Clone)]
pub struct BandTable {
    pub band: usize,
    pub rows: Vec<BandRow>,
}

/// Identity of band 1 plus the statistics of every band, in band order
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub uid: i64,
    pub site_name: String,
    pub image: String,
    pub window: AcquisitionWindow,
    pub stats: Vec<StatisticTuple>,
}

/// Wide per-(site, image) table for one product family
#[derive(Debug, Clone)]
pub struct MergedTable {
    pub variable: String,
    pub band_count: usize,
    pub rows: Vec<MergedRow>,
}

/// Error types for zonal statistics processing
#[derive(Debug, thiserror::Error)]
pub enum ZonalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },

    #[error("Opening {} did not finish within {seconds}s", .path.display())]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Invalid date token: {0}")]
    Format(String),

    #[error("Raster shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Band tables disagree: {0}")]
    SchemaMismatch(String),

    #[error("Zone {uid} has no valid pixels in band {band} of {image}")]
    EmptyZone { uid: i64, image: String, band: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid zone layer: {0}")]
    InvalidZone(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for zonal statistics operations
pub type ZonalResult<T> = Result<T, ZonalError>;
